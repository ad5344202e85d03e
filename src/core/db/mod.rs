/// Database Module
///
/// The driver layer djapi is written against.
///
/// ## Architecture
///
/// - **Driver API** (`driver.rs`): `Driver`, `Connection`, `Statement` and `Cursor` traits,
///   the buffered `RowSet` cursor and the identifier-keyed `DriverRegistry`
/// - **SQLite** (`sqlite.rs`): the built-in rusqlite driver
/// - **Values** (`value.rs`): typed parameter and column values and their conversions
///
/// ## Error Handling
///
/// Every driver operation returns the crate-wide `DjapiError`.
pub mod driver;
pub mod sqlite;
pub mod value;

pub use driver::*;
pub use sqlite::{SqliteDriver, GENERATED_KEY_COLUMN};
pub use value::*;
