/// Driver Module
///
/// The primitive database API the rest of djapi is written against:
/// open a connection, prepare a statement, bind parameters, execute and walk
/// a cursor. Drivers are looked up by identifier in a `DriverRegistry`.

use crate::core::db::sqlite::SqliteDriver;
use crate::core::db::value::Value;
use crate::core::{DjapiError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Whether a statement should keep the keys generated by its execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKeys {
    /// Generated keys are discarded
    Discard,
    /// Generated keys can be fetched after an update
    Return,
}

impl Default for GeneratedKeys {
    fn default() -> Self {
        GeneratedKeys::Discard
    }
}

/// A database client implementation
pub trait Driver: Send + Sync {
    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns `DjapiError::Connection` if the database refuses the
    /// connection or the URL is not understood by this driver.
    fn open(&self, url: &str, login: &str, password: &str) -> Result<Box<dyn Connection>>;
}

/// An open database connection
pub trait Connection: Send {
    /// Compiles `sql` into a statement.
    fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> Result<Box<dyn Statement>>;

    /// Closes the connection. Closing twice is not an error.
    fn close(&mut self) -> Result<()>;

    /// Returns true once `close` has succeeded
    fn is_closed(&self) -> bool;
}

/// A prepared, parameterized statement
pub trait Statement: Send {
    /// SQL text this statement was prepared from
    fn sql(&self) -> &str;

    /// Number of positional parameters
    fn parameter_count(&self) -> usize;

    /// Binds `value` at the 1-based `position`.
    fn bind(&mut self, position: usize, value: Value) -> Result<()>;

    /// Executes the statement as a query.
    fn execute_query(&mut self) -> Result<Box<dyn Cursor>>;

    /// Executes the statement as an insert, update or delete and returns
    /// the number of affected rows.
    fn execute_update(&mut self) -> Result<u64>;

    /// Returns the keys generated by the last `execute_update`.
    fn generated_keys(&mut self) -> Result<Box<dyn Cursor>>;

    /// Releases the statement. Closing twice is not an error.
    fn close(&mut self) -> Result<()>;
}

/// A cursor over the rows produced by a statement.
///
/// A new cursor is positioned before the first row.
pub trait Cursor: Send {
    /// Column names, in result order
    fn columns(&self) -> &[String];

    /// Moves to the next row, returning false when no row is left.
    fn next(&mut self) -> Result<bool>;

    /// Reads `column` from the current row. Lookup ignores case.
    fn value(&self, column: &str) -> Result<Value>;

    /// Releases the cursor. Closing twice is not an error.
    fn close(&mut self) -> Result<()>;
}

/// Fully buffered cursor.
///
/// Drivers that materialize their results up front hand these out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// 0 is before the first row, `rows.len() + 1` is after the last
    position: usize,
    closed: bool,
}

impl RowSet {
    /// Creates a new RowSet from column names and row data
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        RowSet {
            columns,
            rows,
            position: 0,
            closed: false,
        }
    }

    /// Creates a RowSet without rows
    pub fn empty(columns: Vec<String>) -> Self {
        RowSet::new(columns, Vec::new())
    }

    /// Number of buffered rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(DjapiError::Read("cursor is closed".to_string()));
        }
        Ok(())
    }
}

impl Cursor for RowSet {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool> {
        self.check_open()?;
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn value(&self, column: &str) -> Result<Value> {
        self.check_open()?;
        if self.position == 0 || self.position > self.rows.len() {
            return Err(DjapiError::Read("no current row".to_string()));
        }
        let index = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .ok_or_else(|| DjapiError::Read(format!("no such column: {}", column)))?;
        Ok(self.rows[self.position - 1][index].clone())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Identifier → driver lookup table
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.ids())
            .finish()
    }
}

impl DriverRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        DriverRegistry::default()
    }

    /// Creates a registry holding the built-in SQLite driver under its
    /// identifiers
    pub fn with_builtin() -> Self {
        let mut registry = DriverRegistry::new();
        let sqlite: Arc<dyn Driver> = Arc::new(SqliteDriver);
        for id in SqliteDriver::IDENTIFIERS {
            registry.register(*id, Arc::clone(&sqlite));
        }
        registry
    }

    /// Registers `driver` under `id`, replacing any driver already there
    pub fn register(&mut self, id: impl Into<String>, driver: Arc<dyn Driver>) {
        let id = id.into();
        debug!("Registering driver {}", id);
        self.drivers.insert(id, driver);
    }

    /// Looks up the driver registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns `DjapiError::UnknownDriver` if nothing is registered under `id`.
    pub fn load(&self, id: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(id)
            .cloned()
            .ok_or_else(|| DjapiError::UnknownDriver(id.to_string()))
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.drivers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Process-wide registry used when no registry is given explicitly
static GLOBAL_REGISTRY: Lazy<RwLock<DriverRegistry>> =
    Lazy::new(|| RwLock::new(DriverRegistry::with_builtin()));

/// Registers `driver` under `id` in the process-wide registry
pub fn register_driver(id: impl Into<String>, driver: Arc<dyn Driver>) {
    match GLOBAL_REGISTRY.write() {
        Ok(mut registry) => registry.register(id, driver),
        Err(poisoned) => poisoned.into_inner().register(id, driver),
    }
}

/// Looks up `id` in the process-wide registry
pub fn load_driver(id: &str) -> Result<Arc<dyn Driver>> {
    match GLOBAL_REGISTRY.read() {
        Ok(registry) => registry.load(id),
        Err(poisoned) => poisoned.into_inner().load(id),
    }
}
