//! Record accessor: the common plumbing behind per-entity data access objects.
//!
//! A concrete accessor owns a `RecordAccessor` and drives it one SQL
//! statement per method:
//!
//! ```no_run
//! use djapi::accessor::RecordAccessor;
//!
//! struct UserAccessor {
//!     base: RecordAccessor,
//! }
//!
//! impl UserAccessor {
//!     fn email_of(&mut self, id: i64) -> Option<String> {
//!         self.base.prepare("SELECT email FROM users WHERE id = ?");
//!         self.base.bind_int(1, id);
//!         let email = self.base.execute_query().then(|| self.base.get_string("email"));
//!         self.base.release_all();
//!         email
//!     }
//! }
//! ```
//!
//! Every operation comes in two forms. The plain form logs failures and
//! falls back to a default (`false`, `-1`, `""`, `None`); the `try_` form
//! returns the failure, and separates "no rows" from "query failed" and SQL
//! NULL from "could not read".

use crate::config::ConnectionConfig;
use crate::core::db::{Connection, Cursor, DriverRegistry, GeneratedKeys, Statement, Value};
use crate::core::{DjapiError, Result};
use chrono::NaiveDateTime;
use tracing::{debug, error, trace, warn};

/// Whether an executed query left the cursor on a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The cursor is positioned on the first row
    Rows,
    /// The query succeeded but produced no rows; there is no cursor
    NoRows,
}

impl QueryOutcome {
    pub fn has_rows(self) -> bool {
        self == QueryOutcome::Rows
    }
}

/// One connection, at most one prepared statement and at most one open
/// cursor.
///
/// The cursor always belongs to the current statement: preparing a new
/// statement releases both. Everything still held is released on drop.
pub struct RecordAccessor {
    connection: Option<Box<dyn Connection>>,
    statement: Option<Box<dyn Statement>>,
    cursor: Option<Box<dyn Cursor>>,
}

impl RecordAccessor {
    /// Connects using the process-wide configuration
    /// (`ConnectionConfig::instance()`).
    ///
    /// A failed connection is logged and leaves the accessor unconnected.
    pub fn new() -> Self {
        RecordAccessor::from_config(ConnectionConfig::instance())
    }

    /// Connects using `config` and the process-wide driver registry.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        RecordAccessor::from_connection(config.connect())
    }

    /// Connects using `config` and the drivers in `registry`.
    pub fn from_config_with(config: &ConnectionConfig, registry: &DriverRegistry) -> Self {
        RecordAccessor::from_connection(config.connect_with(registry))
    }

    /// Wraps an already open connection.
    pub fn with_connection(connection: Box<dyn Connection>) -> Self {
        RecordAccessor::from_connection(Some(connection))
    }

    fn from_connection(connection: Option<Box<dyn Connection>>) -> Self {
        RecordAccessor {
            connection,
            statement: None,
            cursor: None,
        }
    }

    /// Returns true if the accessor holds an open connection
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| !c.is_closed())
            .unwrap_or(false)
    }

    pub fn has_statement(&self) -> bool {
        self.statement.is_some()
    }

    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    /// SQL text of the current statement
    pub fn statement_sql(&self) -> Option<&str> {
        self.statement.as_deref().map(|s| s.sql())
    }

    /// Column names of the current cursor; empty without a cursor
    pub fn column_names(&self) -> Vec<String> {
        self.cursor
            .as_deref()
            .map(|c| c.columns().to_vec())
            .unwrap_or_default()
    }

    // ----- statements -----

    /// Prepares `sql` as the current statement, releasing the previous
    /// statement and cursor. On failure there is no current statement.
    pub fn prepare(&mut self, sql: &str) {
        self.prepare_with_keys(sql, GeneratedKeys::Discard);
    }

    /// Like `prepare`, asking the driver to keep generated keys.
    pub fn prepare_with_keys(&mut self, sql: &str, keys: GeneratedKeys) {
        if let Err(e) = self.try_prepare_with_keys(sql, keys) {
            error!("Unable to prepare query.");
            debug!("Current request: {}", sql);
            trace!("Returned error: {}", e);
        }
    }

    pub fn try_prepare(&mut self, sql: &str) -> Result<()> {
        self.try_prepare_with_keys(sql, GeneratedKeys::Discard)
    }

    /// # Errors
    ///
    /// Returns `DjapiError::Connection` without a connection, or the
    /// driver's `DjapiError::Prepare`.
    pub fn try_prepare_with_keys(&mut self, sql: &str, keys: GeneratedKeys) -> Result<()> {
        if self.statement.is_some() {
            debug!("Replacing statement: {}", self.current_sql());
        }
        self.release_all();

        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| DjapiError::Connection("no connection".to_string()))?;
        self.statement = Some(connection.prepare(sql, keys)?);
        Ok(())
    }

    // ----- parameters -----

    pub fn bind_int(&mut self, position: usize, value: i64) {
        if let Err(e) = self.try_bind(position, Value::Integer(value)) {
            self.log_failure(&format!("Unable to set int: {}", value), &e);
        }
    }

    pub fn bind_string(&mut self, position: usize, value: &str) {
        if let Err(e) = self.try_bind(position, Value::from(value)) {
            self.log_failure(&format!("Unable to set string: {}", value), &e);
        }
    }

    pub fn bind_timestamp(&mut self, position: usize, value: NaiveDateTime) {
        if let Err(e) = self.try_bind(position, Value::Timestamp(value)) {
            self.log_failure(&format!("Unable to set timestamp: {}", value), &e);
        }
    }

    pub fn bind_boolean(&mut self, position: usize, value: bool) {
        if let Err(e) = self.try_bind(position, Value::Boolean(value)) {
            self.log_failure(&format!("Unable to set boolean: {}", value), &e);
        }
    }

    pub fn bind_null(&mut self, position: usize) {
        if let Err(e) = self.try_bind(position, Value::Null) {
            self.log_failure("Unable to set NULL", &e);
        }
    }

    /// Binds `value` at the 1-based `position` of the current statement.
    ///
    /// A failed bind leaves earlier bindings in place.
    pub fn try_bind(&mut self, position: usize, value: Value) -> Result<()> {
        self.statement
            .as_mut()
            .ok_or_else(|| DjapiError::Bind("no statement prepared".to_string()))?
            .bind(position, value)
    }

    // ----- execution -----

    /// Runs the current statement as a query and moves to its first row.
    ///
    /// Returns false both when the query produced no rows and when it
    /// failed; `try_execute_query` tells the two apart.
    pub fn execute_query(&mut self) -> bool {
        match self.try_execute_query() {
            Ok(outcome) => outcome.has_rows(),
            Err(e) => {
                self.log_failure("Unable to execute query.", &e);
                false
            }
        }
    }

    /// # Errors
    ///
    /// Returns `DjapiError::Execution` without a statement or when the
    /// driver fails to run it.
    pub fn try_execute_query(&mut self) -> Result<QueryOutcome> {
        self.release_cursor();
        let cursor = self
            .statement
            .as_mut()
            .ok_or_else(|| DjapiError::Execution("no statement prepared".to_string()))?
            .execute_query()?;
        self.position_on_first_row(cursor)
    }

    /// Runs the current statement as an insert, update or delete.
    pub fn execute_update(&mut self) -> bool {
        match self.try_execute_update() {
            Ok(_) => true,
            Err(e) => {
                self.log_failure("Unable to execute update.", &e);
                false
            }
        }
    }

    /// Returns the number of affected rows.
    pub fn try_execute_update(&mut self) -> Result<u64> {
        self.statement
            .as_mut()
            .ok_or_else(|| DjapiError::Execution("no statement prepared".to_string()))?
            .execute_update()
    }

    /// Loads the keys generated by the last update into the cursor,
    /// positioned on the first key. Leaves no cursor if there are none or
    /// the driver fails; check `has_cursor` afterwards.
    pub fn fetch_generated_keys(&mut self) {
        if let Err(e) = self.try_fetch_generated_keys() {
            self.log_failure("Unable to get generated keys!", &e);
        }
    }

    pub fn try_fetch_generated_keys(&mut self) -> Result<QueryOutcome> {
        self.release_cursor();
        let keys = self
            .statement
            .as_mut()
            .ok_or_else(|| DjapiError::Execution("no statement prepared".to_string()))?
            .generated_keys()?;
        self.position_on_first_row(keys)
    }

    fn position_on_first_row(&mut self, mut cursor: Box<dyn Cursor>) -> Result<QueryOutcome> {
        match cursor.next() {
            Ok(true) => {
                self.cursor = Some(cursor);
                Ok(QueryOutcome::Rows)
            }
            Ok(false) => {
                close_cursor(cursor);
                Ok(QueryOutcome::NoRows)
            }
            Err(e) => {
                close_cursor(cursor);
                Err(e)
            }
        }
    }

    // ----- cursor -----

    /// Moves the cursor to the next row.
    ///
    /// Returns false once the rows are exhausted (and on every later call)
    /// as well as on failure.
    pub fn advance_cursor(&mut self) -> bool {
        match self.try_advance_cursor() {
            Ok(valid) => valid,
            Err(e) => {
                self.log_failure("Cursor error.", &e);
                false
            }
        }
    }

    pub fn try_advance_cursor(&mut self) -> Result<bool> {
        self.cursor
            .as_mut()
            .ok_or_else(|| DjapiError::Read("no open cursor".to_string()))?
            .next()
    }

    /// Reads `column` as an integer; -1 for NULL or on failure.
    pub fn get_int(&self, column: &str) -> i64 {
        self.or_default(column, "integer", self.try_get_int(column), -1)
    }

    /// Reads `column` as a string; empty for NULL or on failure.
    pub fn get_string(&self, column: &str) -> String {
        self.or_default(column, "string", self.try_get_string(column), String::new())
    }

    /// Reads `column` as a boolean; false for NULL or on failure.
    pub fn get_boolean(&self, column: &str) -> bool {
        self.or_default(column, "boolean", self.try_get_boolean(column), false)
    }

    /// Reads `column` as a timestamp; None for NULL or on failure.
    pub fn get_timestamp(&self, column: &str) -> Option<NaiveDateTime> {
        self.or_default(column, "timestamp", self.try_get_timestamp(column).map(|v| v.map(Some)), None)
    }

    /// `Ok(None)` is SQL NULL.
    ///
    /// # Errors
    ///
    /// Returns `DjapiError::Read` without a current row, for an unknown
    /// column, or when the value cannot be converted.
    pub fn try_get_int(&self, column: &str) -> Result<Option<i64>> {
        self.column_value(column)?.as_int()
    }

    pub fn try_get_string(&self, column: &str) -> Result<Option<String>> {
        self.column_value(column)?.as_string()
    }

    pub fn try_get_boolean(&self, column: &str) -> Result<Option<bool>> {
        self.column_value(column)?.as_bool()
    }

    pub fn try_get_timestamp(&self, column: &str) -> Result<Option<NaiveDateTime>> {
        self.column_value(column)?.as_timestamp()
    }

    /// Raw value of `column` in the current row
    pub fn column_value(&self, column: &str) -> Result<Value> {
        self.cursor
            .as_deref()
            .ok_or_else(|| DjapiError::Read("no current row".to_string()))?
            .value(column)
    }

    fn or_default<T>(&self, column: &str, kind: &str, read: Result<Option<T>>, default: T) -> T {
        match read {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("Column {} is NULL", column);
                default
            }
            Err(e) => {
                self.log_failure(&format!("Unable to get {} from column {}", kind, column), &e);
                default
            }
        }
    }

    // ----- release -----

    /// Releases the cursor and then the statement. A failure to release
    /// one does not stop the other; both are logged. The connection stays
    /// open. Calling this again is a no-op.
    pub fn release_all(&mut self) {
        self.release_cursor();
        if let Some(mut statement) = self.statement.take() {
            if let Err(e) = statement.close() {
                warn!("Unable to close statement!");
                debug!("Current statement: {}", statement.sql());
                trace!("Returned error: {}", e);
            }
        }
    }

    fn release_cursor(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            close_cursor(cursor);
        }
    }

    /// Releases the cursor, the statement and the connection.
    ///
    /// # Errors
    ///
    /// Returns the first release failure; every resource is still attempted.
    pub fn close(mut self) -> Result<()> {
        let cursor = self.cursor.take().map_or(Ok(()), |mut c| c.close());
        let statement = self.statement.take().map_or(Ok(()), |mut s| s.close());
        let connection = self.connection.take().map_or(Ok(()), |mut c| c.close());
        cursor.and(statement).and(connection)
    }

    fn current_sql(&self) -> &str {
        self.statement_sql().unwrap_or("<none>")
    }

    fn log_failure(&self, message: &str, e: &DjapiError) {
        error!("{}", message);
        debug!("Current statement: {}", self.current_sql());
        trace!("Returned error: {}", e);
    }
}

impl Drop for RecordAccessor {
    fn drop(&mut self) {
        self.release_all();
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                warn!("Unable to close connection");
                trace!("Returned error: {}", e);
            }
        }
    }
}

fn close_cursor(mut cursor: Box<dyn Cursor>) {
    if let Err(e) = cursor.close() {
        warn!("Unable to close cursor");
        trace!("Returned error: {}", e);
    }
}
