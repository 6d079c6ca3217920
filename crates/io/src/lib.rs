// File I/O operations

pub mod error;
pub mod loader;
pub mod sqlite;
pub mod xml;

pub use error::LoadError;
pub use loader::{load_bundle, load_dir, load_subject, present_subjects};
pub use sqlite::{SqlMapped, SqliteStore};

/// SQLite schema version
/// Increment when the schema changes in a way that old versions can't read
pub const SCHEMA_VERSION: u32 = 1;
