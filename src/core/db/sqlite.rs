/// SQLite Driver Module
///
/// Built-in driver backed by rusqlite. Statements are checked when they are
/// prepared and compiled again from rusqlite's statement cache when they
/// run; query results are buffered into a `RowSet`.

use crate::core::db::driver::{Connection, Cursor, Driver, GeneratedKeys, RowSet, Statement};
use crate::core::db::value::{Value, TIMESTAMP_FORMAT};
use crate::core::{DjapiError, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Column name under which `generated_keys` reports the inserted row id
pub const GENERATED_KEY_COLUMN: &str = "generated_key";

/// URL prefixes stripped before the remainder is used as a database path
const URL_PREFIXES: &[&str] = &["jdbc:sqlite:", "sqlite://", "sqlite:"];

/// The rusqlite-backed driver
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    /// Identifiers this driver is registered under by default
    pub const IDENTIFIERS: &'static [&'static str] = &["sqlite", "org.sqlite.JDBC"];
}

impl Driver for SqliteDriver {
    fn open(&self, url: &str, login: &str, _password: &str) -> Result<Box<dyn Connection>> {
        let path = database_path(url);
        if !login.is_empty() {
            trace!("SQLite ignores login {}", login);
        }

        let conn = if path.is_empty() || path == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(path)
        }
        .map_err(|e| DjapiError::Connection(format!("cannot open {}: {}", url, e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DjapiError::Connection(format!("cannot initialize {}: {}", url, e)))?;

        debug!("Opened SQLite database {}", if path.is_empty() { ":memory:" } else { path });
        Ok(Box::new(SqliteConnection {
            shared: SharedConnection(Arc::new(Mutex::new(Some(conn)))),
        }))
    }
}

/// Extracts the file path from a SQLite URL
pub fn database_path(url: &str) -> &str {
    let url = url.trim();
    URL_PREFIXES
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .unwrap_or(url)
}

/// Connection handle shared between a connection and its statements.
///
/// `None` once the connection has been closed.
#[derive(Debug, Clone)]
struct SharedConnection(Arc<Mutex<Option<rusqlite::Connection>>>);

impl SharedConnection {
    fn with<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let guard = self
            .0
            .lock()
            .map_err(|_| DjapiError::Connection("connection lock poisoned".to_string()))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| DjapiError::Connection("connection is closed".to_string()))?;
        f(conn)
    }

    fn is_closed(&self) -> bool {
        self.0.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

/// An open SQLite connection
#[derive(Debug)]
pub struct SqliteConnection {
    shared: SharedConnection,
}

impl Connection for SqliteConnection {
    fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> Result<Box<dyn Statement>> {
        let parameter_count = self.shared.with(|conn| {
            let stmt = conn
                .prepare_cached(sql)
                .map_err(|e| DjapiError::Prepare(e.to_string()))?;
            Ok(stmt.parameter_count())
        })?;

        Ok(Box::new(SqliteStatement {
            shared: self.shared.clone(),
            sql: sql.to_string(),
            parameters: vec![None; parameter_count],
            keys,
            last_insert_id: None,
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        let mut guard = self
            .shared
            .0
            .lock()
            .map_err(|_| DjapiError::Release("connection lock poisoned".to_string()))?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(conn, e)| {
                *guard = Some(conn);
                DjapiError::Release(format!("cannot close connection: {}", e))
            }),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

/// A prepared SQLite statement with its pending bindings
#[derive(Debug)]
pub struct SqliteStatement {
    shared: SharedConnection,
    sql: String,
    parameters: Vec<Option<Value>>,
    keys: GeneratedKeys,
    last_insert_id: Option<i64>,
    closed: bool,
}

impl SqliteStatement {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(DjapiError::Execution("statement is closed".to_string()));
        }
        Ok(())
    }

    fn bound_values(&self) -> Result<Vec<SqlValue>> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.as_ref().map(to_sql_value).ok_or_else(|| {
                    DjapiError::Execution(format!("no value specified for parameter {}", i + 1))
                })
            })
            .collect()
    }
}

impl Statement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn bind(&mut self, position: usize, value: Value) -> Result<()> {
        if self.closed {
            return Err(DjapiError::Bind("statement is closed".to_string()));
        }
        if position == 0 || position > self.parameters.len() {
            return Err(DjapiError::Bind(format!(
                "parameter index {} out of range (statement has {})",
                position,
                self.parameters.len()
            )));
        }
        self.parameters[position - 1] = Some(value);
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn Cursor>> {
        self.check_open()?;
        let params = self.bound_values()?;
        let sql = &self.sql;

        let rows = self.shared.with(|conn| {
            let mut stmt = conn.prepare_cached(sql).map_err(execution_error)?;
            if stmt.column_count() == 0 {
                return Err(DjapiError::Execution(
                    "statement does not return rows".to_string(),
                ));
            }
            for (i, value) in params.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value).map_err(execution_error)?;
            }

            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let column_count = columns.len();

            let mut data = Vec::new();
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next().map_err(execution_error)? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(from_value_ref(row.get_ref(i).map_err(execution_error)?));
                }
                data.push(values);
            }
            Ok(RowSet::new(columns, data))
        })?;

        trace!("Query returned {} rows: {}", rows.len(), self.sql);
        Ok(Box::new(rows))
    }

    fn execute_update(&mut self) -> Result<u64> {
        self.check_open()?;
        let params = self.bound_values()?;
        let sql = &self.sql;
        let keys = self.keys;

        let (affected, inserted) = self.shared.with(|conn| {
            let mut stmt = conn.prepare_cached(sql).map_err(execution_error)?;
            for (i, value) in params.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value).map_err(execution_error)?;
            }
            if stmt.column_count() > 0 && stmt.readonly() {
                return Err(DjapiError::Execution("statement returns rows".to_string()));
            }
            let rowid_before = conn.last_insert_rowid();
            let affected = stmt.raw_execute().map_err(execution_error)?;
            let rowid_after = conn.last_insert_rowid();
            // UPDATE and DELETE leave the last inserted rowid untouched
            let inserted = (keys == GeneratedKeys::Return
                && affected > 0
                && (rowid_after != rowid_before || is_insert(sql)))
                .then_some(rowid_after);
            Ok((affected, inserted))
        })?;

        self.last_insert_id = inserted;
        Ok(affected as u64)
    }

    fn generated_keys(&mut self) -> Result<Box<dyn Cursor>> {
        self.check_open()?;
        if self.keys != GeneratedKeys::Return {
            return Err(DjapiError::Execution(
                "statement was not prepared to return generated keys".to_string(),
            ));
        }
        let rows = self
            .last_insert_id
            .map(|id| vec![vec![Value::Integer(id)]])
            .unwrap_or_default();
        Ok(Box::new(RowSet::new(vec![GENERATED_KEY_COLUMN.to_string()], rows)))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"]
        .iter()
        .any(|kw| head.get(..kw.len()).is_some_and(|h| h.eq_ignore_ascii_case(kw)))
}

fn execution_error(e: rusqlite::Error) -> DjapiError {
    DjapiError::Execution(e.to_string())
}

/// Converts a bound value into its SQLite storage form
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Timestamp(ts) => SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
