// Database module
// Dual store: SQLite for the file manifest and chunk ledger, LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
