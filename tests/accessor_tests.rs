//! End-to-end tests: a per-entity accessor built on `RecordAccessor`,
//! backed by a SQLite file configured through a configuration file.

use chrono::{NaiveDate, NaiveDateTime};
use djapi::core::db::{
    register_driver, Connection, Driver, GeneratedKeys, GENERATED_KEY_COLUMN,
};
use djapi::{ConnectionConfig, Properties, QueryOutcome, RecordAccessor, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir};

#[derive(Debug, Clone, PartialEq)]
struct Member {
    id: i64,
    name: String,
    active: bool,
    joined_at: Option<NaiveDateTime>,
}

/// Accessor for the `members` table, one SQL statement per method
struct MemberAccessor {
    base: RecordAccessor,
}

impl MemberAccessor {
    fn new(config: &ConnectionConfig) -> Self {
        let mut base = RecordAccessor::from_config(config);
        base.prepare(
            "CREATE TABLE IF NOT EXISTS members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                joined_at TEXT
            )",
        );
        base.execute_update();
        base.release_all();
        MemberAccessor { base }
    }

    fn insert(&mut self, name: &str, active: bool, joined_at: Option<NaiveDateTime>) -> Option<i64> {
        self.base.prepare_with_keys(
            "INSERT INTO members (name, active, joined_at) VALUES (?, ?, ?)",
            GeneratedKeys::Return,
        );
        self.base.bind_string(1, name);
        self.base.bind_boolean(2, active);
        match joined_at {
            Some(ts) => self.base.bind_timestamp(3, ts),
            None => self.base.bind_null(3),
        }
        if !self.base.execute_update() {
            self.base.release_all();
            return None;
        }
        self.base.fetch_generated_keys();
        let id = self
            .base
            .has_cursor()
            .then(|| self.base.get_int(GENERATED_KEY_COLUMN));
        self.base.release_all();
        id
    }

    fn find(&mut self, id: i64) -> Option<Member> {
        self.base.prepare("SELECT id, name, active, joined_at FROM members WHERE id = ?");
        self.base.bind_int(1, id);
        let member = self.base.execute_query().then(|| self.read_row());
        self.base.release_all();
        member
    }

    fn active(&mut self) -> Vec<Member> {
        let mut members = Vec::new();
        self.base
            .prepare("SELECT id, name, active, joined_at FROM members WHERE active = ? ORDER BY id");
        self.base.bind_boolean(1, true);
        if self.base.execute_query() {
            loop {
                members.push(self.read_row());
                if !self.base.advance_cursor() {
                    break;
                }
            }
        }
        self.base.release_all();
        members
    }

    fn deactivate(&mut self, id: i64) -> bool {
        self.base.prepare("UPDATE members SET active = ? WHERE id = ?");
        self.base.bind_boolean(1, false);
        self.base.bind_int(2, id);
        let updated = self.base.execute_update();
        self.base.release_all();
        updated
    }

    fn read_row(&self) -> Member {
        Member {
            id: self.base.get_int("id"),
            name: self.base.get_string("name"),
            active: self.base.get_boolean("active"),
            joined_at: self.base.get_timestamp("joined_at"),
        }
    }
}

fn file_config(dir: &TempDir) -> (NamedTempFile, ConnectionConfig) {
    let mut file = NamedTempFile::new_in(dir.path()).unwrap();
    writeln!(file, "# members database").unwrap();
    writeln!(file, "Driver=org.sqlite.JDBC").unwrap();
    writeln!(file, "Url=jdbc:sqlite:{}", dir.path().join("members.db").display()).unwrap();
    writeln!(file, "Login=").unwrap();
    writeln!(file, "Password=").unwrap();
    let config = ConnectionConfig::from_file(file.path());
    (file, config)
}

fn joined(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[test]
fn test_member_accessor_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (_file, config) = file_config(&dir);
    let mut members = MemberAccessor::new(&config);

    let ada = members.insert("ada", true, Some(joined(1))).unwrap();
    let bea = members.insert("bea", true, None).unwrap();
    let cy = members.insert("cy", true, Some(joined(3))).unwrap();
    assert_eq!((ada, bea, cy), (1, 2, 3));

    assert_eq!(
        members.find(bea),
        Some(Member {
            id: 2,
            name: "bea".to_string(),
            active: true,
            joined_at: None,
        })
    );
    assert_eq!(members.find(99), None);

    assert!(members.deactivate(bea));
    let active: Vec<String> = members.active().into_iter().map(|m| m.name).collect();
    assert_eq!(active, vec!["ada", "cy"]);
}

#[test]
fn test_data_survives_new_accessor() {
    let dir = tempfile::tempdir().unwrap();
    let (_file, config) = file_config(&dir);

    let mut first = MemberAccessor::new(&config);
    first.insert("dee", true, Some(joined(9))).unwrap();
    drop(first);

    let mut second = MemberAccessor::new(&config);
    let dee = second.find(1).unwrap();
    assert_eq!(dee.name, "dee");
    assert_eq!(dee.joined_at, Some(joined(9)));
}

#[test]
fn test_try_operations_separate_outcomes() -> Result<()> {
    let config = ConnectionConfig::from_parts("sqlite", "sqlite::memory:", "", "");
    let mut accessor = RecordAccessor::from_config(&config);

    accessor.try_prepare("CREATE TABLE t (v INTEGER)")?;
    accessor.try_execute_update()?;
    accessor.try_prepare("INSERT INTO t (v) VALUES (NULL), (7)")?;
    assert_eq!(accessor.try_execute_update()?, 2);

    accessor.try_prepare("SELECT v FROM t WHERE v > 100")?;
    assert_eq!(accessor.try_execute_query()?, QueryOutcome::NoRows);

    accessor.try_prepare("SELECT v FROM t ORDER BY v")?;
    assert_eq!(accessor.try_execute_query()?, QueryOutcome::Rows);
    assert_eq!(accessor.try_get_int("v")?, None);
    assert!(accessor.try_advance_cursor()?);
    assert_eq!(accessor.try_get_int("v")?, Some(7));
    assert!(!accessor.try_advance_cursor()?);

    accessor.try_prepare("SELECT v FROM t WHERE v = ?")?;
    assert!(accessor.try_execute_query().is_err());

    accessor.close()
}

#[test]
fn test_toml_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("djapi.toml");
    std::fs::write(
        &path,
        format!(
            "[connection]\ndriver = \"sqlite\"\nurl = \"jdbc:sqlite:{}\"\n",
            dir.path().join("toml.db").display()
        ),
    )
    .unwrap();

    let config = ConnectionConfig::from_file(&path);
    assert_eq!(config.login(), "");
    let mut accessor = RecordAccessor::from_config(&config);
    assert!(accessor.is_connected());
    accessor.prepare("SELECT 1 AS one");
    assert!(accessor.execute_query());
    assert_eq!(accessor.get_int("one"), 1);
}

/// Driver that only records how it was opened
struct OpenRecorder {
    calls: Mutex<Vec<(String, String, String)>>,
}

impl Driver for OpenRecorder {
    fn open(&self, url: &str, login: &str, password: &str) -> Result<Box<dyn Connection>> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), login.to_string(), password.to_string()));
        Err(djapi::DjapiError::Connection("recording only".to_string()))
    }
}

#[test]
fn test_connect_from_properties_uses_named_driver() {
    let recorder = Arc::new(OpenRecorder {
        calls: Mutex::new(Vec::new()),
    });
    register_driver("drv", recorder.clone());

    let mut props = Properties::new();
    props.set("Driver", "drv");
    props.set("Url", "u");
    props.set("Login", "l");
    props.set("Password", "p");
    let config = ConnectionConfig::from_properties(&props);

    assert!(config.connect().is_none());
    assert_eq!(
        *recorder.calls.lock().unwrap(),
        vec![("u".to_string(), "l".to_string(), "p".to_string())]
    );

    let accessor = RecordAccessor::from_config(&config);
    assert!(!accessor.is_connected());
    assert_eq!(recorder.calls.lock().unwrap().len(), 2);
}
