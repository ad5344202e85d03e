// Core infrastructure modules
pub mod core;

// Connection configuration and data access
pub mod accessor;
pub mod config;
pub mod properties;

#[cfg(test)]
mod test_utils;

pub use accessor::{QueryOutcome, RecordAccessor};
pub use config::ConnectionConfig;
pub use crate::core::{DjapiError, Result};
pub use properties::Properties;
