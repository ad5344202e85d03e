use crate::core::db::{load_driver, Connection, DriverRegistry};
use crate::core::{DjapiError, Result};
use crate::properties::Properties;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace, warn};

/// File read when no path is given, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "djapi_connect";

/// Property keys recognized in configuration files and property bags.
pub const KEY_DRIVER: &str = "Driver";
pub const KEY_URL: &str = "Url";
pub const KEY_LOGIN: &str = "Login";
pub const KEY_PASSWORD: &str = "Password";

/// Process-wide configuration, set by whichever `instance*` call runs first.
static INSTANCE: OnceCell<ConnectionConfig> = OnceCell::new();

/// Where a configuration's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Read from a configuration file (possibly unsuccessfully)
    File,
    /// Passed in as explicit values
    Explicit,
    /// Taken from a property bag
    Properties,
}

/// TOML layout accepted for `.toml` configuration files.
///
/// ```toml
/// [connection]
/// driver = "sqlite"
/// url = "jdbc:sqlite:app.db"
/// login = ""
/// password = ""
/// ```
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub connection: ConnectionSection,
}

/// The `[connection]` table of a TOML configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionSection {
    pub driver: Option<String>,
    pub url: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
}

/// Database connection parameters: driver identifier, URL, login and password.
///
/// Values are fixed once constructed. Use the `from_*` constructors to build
/// a value to hand to record accessors, or the `instance*` entry points to
/// share one configuration across the whole process.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    driver: String,
    url: String,
    login: String,
    password: String,
    source_path: PathBuf,
    origin: ConfigOrigin,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("source_path", &self.source_path)
            .field("origin", &self.origin)
            .finish()
    }
}

impl ConnectionConfig {
    fn empty(source_path: PathBuf, origin: ConfigOrigin) -> Self {
        ConnectionConfig {
            driver: String::new(),
            url: String::new(),
            login: String::new(),
            password: String::new(),
            source_path,
            origin,
        }
    }

    /// Loads the configuration from `djapi_connect` in the working directory.
    pub fn from_default_file() -> Self {
        ConnectionConfig::from_file(DEFAULT_CONFIG_PATH)
    }

    /// Loads the configuration from the file at `path`.
    ///
    /// A missing or unreadable file is not an error: a warning is logged
    /// and every field stays empty.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        ConnectionConfig::try_from_file(path).unwrap_or_else(|e| {
            warn!(
                "Unable to read configuration {}: {}. If the default path was used, be sure to create the {} file",
                path.display(),
                e,
                DEFAULT_CONFIG_PATH
            );
            ConnectionConfig::empty(path.to_path_buf(), ConfigOrigin::File)
        })
    }

    /// Loads the configuration from the file at `path`, reporting failures.
    ///
    /// Files ending in `.toml` are read as TOML; anything else is read as a
    /// properties file.
    ///
    /// # Errors
    ///
    /// Returns `DjapiError::Io` if the file cannot be read, and
    /// `DjapiError::Toml` or `DjapiError::Config` if it cannot be parsed.
    pub fn try_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading connection configuration from {}", path.display());

        let mut config = if is_toml(path) {
            let content = fs::read_to_string(path)?;
            let file: ConfigFile = toml::from_str(&content)?;
            ConnectionConfig::from_section(file.connection)
        } else {
            ConnectionConfig::from_properties(&Properties::load(path)?)
        };
        config.source_path = path.to_path_buf();
        config.origin = ConfigOrigin::File;
        Ok(config)
    }

    /// Builds a configuration from explicit values, without any file I/O.
    pub fn from_parts(
        driver: impl Into<String>,
        url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ConnectionConfig {
            driver: driver.into(),
            url: url.into(),
            login: login.into(),
            password: password.into(),
            source_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            origin: ConfigOrigin::Explicit,
        }
    }

    /// Builds a configuration from the `Driver`, `Url`, `Login` and
    /// `Password` entries of `properties`. Missing entries stay empty.
    pub fn from_properties(properties: &Properties) -> Self {
        let field = |key: &str| {
            properties.get(key).map(str::to_string).unwrap_or_else(|| {
                debug!("Configuration has no {} entry", key);
                String::new()
            })
        };
        ConnectionConfig {
            driver: field(KEY_DRIVER),
            url: field(KEY_URL),
            login: field(KEY_LOGIN),
            password: field(KEY_PASSWORD),
            source_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            origin: ConfigOrigin::Properties,
        }
    }

    fn from_section(section: ConnectionSection) -> Self {
        let mut config =
            ConnectionConfig::empty(PathBuf::from(DEFAULT_CONFIG_PATH), ConfigOrigin::File);
        config.driver = section.driver.unwrap_or_default();
        config.url = section.url.unwrap_or_default();
        config.login = section.login.unwrap_or_default();
        config.password = section.password.unwrap_or_default();
        config
    }

    /// Returns the process-wide configuration, loading it from
    /// `djapi_connect` if no configuration exists yet.
    ///
    /// Whichever `instance*` entry point runs first decides the values;
    /// arguments to every later call are ignored.
    pub fn instance() -> &'static ConnectionConfig {
        INSTANCE.get_or_init(ConnectionConfig::from_default_file)
    }

    /// Returns the process-wide configuration, loading it from `path` if no
    /// configuration exists yet.
    pub fn instance_from_file<P: AsRef<Path>>(path: P) -> &'static ConnectionConfig {
        INSTANCE.get_or_init(|| ConnectionConfig::from_file(path))
    }

    /// Returns the process-wide configuration, built from the given values
    /// if no configuration exists yet.
    pub fn instance_from_parts(
        driver: impl Into<String>,
        url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> &'static ConnectionConfig {
        INSTANCE.get_or_init(|| ConnectionConfig::from_parts(driver, url, login, password))
    }

    /// Returns the process-wide configuration, built from `properties` if no
    /// configuration exists yet.
    pub fn instance_from_properties(properties: &Properties) -> &'static ConnectionConfig {
        INSTANCE.get_or_init(|| ConnectionConfig::from_properties(properties))
    }

    /// Returns the process-wide configuration if one has been created.
    pub fn current() -> Option<&'static ConnectionConfig> {
        INSTANCE.get()
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The file the values were read from, or `djapi_connect` for
    /// configurations that did not come from a file.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.origin
    }

    /// Opens a new connection through the process-wide driver registry.
    ///
    /// Returns `None` if the driver is unknown or the connection is
    /// refused; the failure is logged.
    pub fn connect(&self) -> Option<Box<dyn Connection>> {
        self.log_connect(self.try_connect())
    }

    /// Opens a new connection through `registry`.
    ///
    /// Returns `None` if the driver is unknown or the connection is
    /// refused; the failure is logged.
    pub fn connect_with(&self, registry: &DriverRegistry) -> Option<Box<dyn Connection>> {
        self.log_connect(self.try_connect_with(registry))
    }

    /// Opens a new connection through the process-wide driver registry.
    ///
    /// # Errors
    ///
    /// Returns `DjapiError::UnknownDriver` if no driver is registered under
    /// the configured identifier, or the driver's `DjapiError::Connection`.
    pub fn try_connect(&self) -> Result<Box<dyn Connection>> {
        let driver = load_driver(&self.driver)?;
        driver.open(&self.url, &self.login, &self.password)
    }

    /// Opens a new connection through `registry`.
    pub fn try_connect_with(&self, registry: &DriverRegistry) -> Result<Box<dyn Connection>> {
        let driver = registry.load(&self.driver)?;
        driver.open(&self.url, &self.login, &self.password)
    }

    fn log_connect(&self, result: Result<Box<dyn Connection>>) -> Option<Box<dyn Connection>> {
        match result {
            Ok(conn) => {
                trace!("Connection set up on {}", self.url);
                Some(conn)
            }
            Err(DjapiError::UnknownDriver(id)) => {
                error!("Unable to load the following driver: {}", id);
                None
            }
            Err(e) => {
                error!("Unable to set the connection @Url: {}", self.url);
                trace!("Returned error: {}", e);
                None
            }
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}
