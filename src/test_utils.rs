/// # Test Utilities Module
///
/// Shared fixtures for djapi's unit tests:
/// - Temporary configuration files
/// - SQLite database fixtures with a sample schema
/// - A recording driver and a scripted connection for observing what the
///   record accessor asks of its driver

use crate::config::ConnectionConfig;
use crate::core::db::{Connection, Cursor, Driver, GeneratedKeys, RowSet, Statement, Value};
use crate::core::{DjapiError, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::{Builder, NamedTempFile, TempDir};

/// Writes `content` to a fresh temporary file whose name ends in `suffix`
pub fn write_config(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = Builder::new()
        .prefix("djapi_connect")
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp config");
    file.write_all(content.as_bytes())
        .expect("Failed to write temp config");
    file
}

/// SQLite database file with the sample schema, plus a configuration
/// pointing at it
pub struct DatabaseFixture {
    /// Keeps the database directory alive
    _dir: TempDir,
    pub config: ConnectionConfig,
}

impl DatabaseFixture {
    /// Create an empty database file
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = format!("jdbc:sqlite:{}", dir.path().join("fixture.db").display());
        let config = ConnectionConfig::from_parts("sqlite", url, "", "");
        Ok(DatabaseFixture { _dir: dir, config })
    }

    /// Create fixture with the sample schema and data
    pub fn with_sample_data() -> Result<Self> {
        let fixture = Self::new()?;
        let mut conn = fixture.config.try_connect()?;
        for sql in [
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT,
                created_at DATETIME,
                active BOOLEAN DEFAULT 1
            )",
            "INSERT INTO users (username, email, created_at, active)
                VALUES ('alice', 'alice@example.com', '2024-01-15 09:30:00', 1)",
            "INSERT INTO users (username, email, created_at, active)
                VALUES ('bob', NULL, NULL, 0)",
            "INSERT INTO users (username, email, created_at, active)
                VALUES ('charlie', 'charlie@example.com', '2024-02-01 18:00:00.500', 1)",
        ] {
            conn.prepare(sql, GeneratedKeys::Discard)?.execute_update()?;
        }
        conn.close()?;
        Ok(fixture)
    }
}

/// Driver that records every `open` call and hands out scripted connections
#[derive(Default)]
pub struct RecordingDriver {
    opened: Mutex<Vec<(String, String, String)>>,
    pub rows: RowSet,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingDriver {
    /// (url, login, password) of every successful open, in order
    pub fn opened(&self) -> Vec<(String, String, String)> {
        self.opened.lock().unwrap().clone()
    }
}

impl Driver for RecordingDriver {
    fn open(&self, url: &str, login: &str, password: &str) -> Result<Box<dyn Connection>> {
        self.opened
            .lock()
            .unwrap()
            .push((url.to_string(), login.to_string(), password.to_string()));
        Ok(Box::new(ScriptedConnection::new(self.rows.clone(), Arc::clone(&self.events))))
    }
}

/// Connection whose statements always return the same rows.
///
/// Every call is appended to `events`; `failing_close` makes every close
/// fail.
pub struct ScriptedConnection {
    rows: RowSet,
    events: Arc<Mutex<Vec<String>>>,
    pub failing_close: bool,
    closed: bool,
}

impl ScriptedConnection {
    pub fn new(rows: RowSet, events: Arc<Mutex<Vec<String>>>) -> Self {
        ScriptedConnection {
            rows,
            events,
            failing_close: false,
            closed: false,
        }
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Connection for ScriptedConnection {
    fn prepare(&mut self, sql: &str, _keys: GeneratedKeys) -> Result<Box<dyn Statement>> {
        self.record(format!("prepare {}", sql));
        Ok(Box::new(ScriptedStatement {
            sql: sql.to_string(),
            rows: self.rows.clone(),
            events: Arc::clone(&self.events),
            failing_close: self.failing_close,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.record("close connection".to_string());
        if self.failing_close {
            return Err(DjapiError::Release("connection close failed".to_string()));
        }
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct ScriptedStatement {
    sql: String,
    rows: RowSet,
    events: Arc<Mutex<Vec<String>>>,
    failing_close: bool,
}

impl Statement for ScriptedStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn parameter_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    fn bind(&mut self, position: usize, value: Value) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("bind {} {}", position, value));
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(ScriptedCursor {
            rows: self.rows.clone(),
            events: Arc::clone(&self.events),
            failing_close: self.failing_close,
        }))
    }

    fn execute_update(&mut self) -> Result<u64> {
        Ok(1)
    }

    fn generated_keys(&mut self) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(RowSet::empty(vec!["generated_key".to_string()])))
    }

    fn close(&mut self) -> Result<()> {
        self.events.lock().unwrap().push("close statement".to_string());
        if self.failing_close {
            return Err(DjapiError::Release("statement close failed".to_string()));
        }
        Ok(())
    }
}

struct ScriptedCursor {
    rows: RowSet,
    events: Arc<Mutex<Vec<String>>>,
    failing_close: bool,
}

impl Cursor for ScriptedCursor {
    fn columns(&self) -> &[String] {
        self.rows.columns()
    }

    fn next(&mut self) -> Result<bool> {
        self.rows.next()
    }

    fn value(&self, column: &str) -> Result<Value> {
        self.rows.value(column)
    }

    fn close(&mut self) -> Result<()> {
        self.events.lock().unwrap().push("close cursor".to_string());
        if self.failing_close {
            return Err(DjapiError::Release("cursor close failed".to_string()));
        }
        Ok(())
    }
}

/// Asserts that `$result` is an `Err` of the given `DjapiError` variant
macro_rules! assert_djapi_error {
    ($result:expr, $expected_type:ident, $context:expr) => {
        match $result {
            Err($crate::core::DjapiError::$expected_type(_)) => {}
            Ok(_) => panic!("Expected {} error but got Ok in {}", stringify!($expected_type), $context),
            Err(other) => panic!("Expected {} but got {:?} in {}", stringify!($expected_type), other, $context),
        }
    };
}
pub(crate) use assert_djapi_error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_data_fixture() {
        let fixture = DatabaseFixture::with_sample_data().unwrap();
        let mut conn = fixture.config.try_connect().unwrap();
        let mut stmt = conn
            .prepare("SELECT COUNT(*) AS n FROM users", GeneratedKeys::Discard)
            .unwrap();
        let mut cursor = stmt.execute_query().unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.value("n").unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_recording_driver_records_opens() {
        let driver = RecordingDriver::default();
        driver.open("u", "l", "p").unwrap();
        assert_eq!(driver.opened(), vec![("u".into(), "l".into(), "p".into())]);
    }

    #[test]
    fn test_error_assertion_macro() {
        let result: Result<i32> = Err(DjapiError::Bind("bad index".to_string()));
        assert_djapi_error!(result, Bind, "macro test");
    }
}
