/// djapi Error Module
///
/// This module defines the error type shared by the configuration loader,
/// the driver layer and the record accessor. Sentinel-style accessor
/// operations log these errors and fall back to a default; the `try_`
/// variants hand them back to the caller.
use thiserror::Error;

/// Error type for every failure djapi can observe.
///
/// The variants follow the life of a data access call:
/// - Loading the connection configuration
/// - Loading the driver and opening the connection
/// - Preparing, binding and executing statements
/// - Reading result columns
/// - Releasing cursors, statements and connections
#[derive(Error, Debug)]
pub enum DjapiError {
    /// Errors raised by the SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration file missing, unreadable or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// No driver is registered under the requested identifier
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// The driver refused or failed to open a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// SQL text could not be compiled into a statement
    #[error("Prepare error: {0}")]
    Prepare(String),

    /// A parameter could not be bound
    #[error("Bind error: {0}")]
    Bind(String),

    /// A query or update failed to execute
    #[error("Execution error: {0}")]
    Execution(String),

    /// A column could not be read from the current row
    #[error("Read error: {0}")]
    Read(String),

    /// A cursor, statement or connection failed to close
    #[error("Release error: {0}")]
    Release(String),
}

/// Type alias for Result to use DjapiError as the error type.
pub type Result<T> = std::result::Result<T, DjapiError>;
