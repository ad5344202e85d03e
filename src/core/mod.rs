/// Core Module for djapi
///
/// Shared infrastructure: the error type and the database driver layer
/// that configuration and record accessors are built on.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DjapiError, Result};
