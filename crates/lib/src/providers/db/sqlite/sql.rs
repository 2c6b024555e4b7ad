//! # SQLite Specific SQL Queries
//!
//! This module centralizes SQL query strings for the SQLite source.
//! This makes the core logic cleaner and isolates database-specific syntax.

use crate::providers::db::storage::quote_identifier;

/// Lists user tables, skipping SQLite's internal `sqlite_*` catalogs.
pub const LIST_TABLES: &str = "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Enables write-ahead logging.
pub const ENABLE_WAL: &str = "PRAGMA journal_mode=WAL;";

/// Returns the `PRAGMA table_info` statement for a table.
///
/// Result columns: `cid, name, type, notnull, dflt_value, pk`.
pub fn table_info(table: &str) -> String {
    format!("PRAGMA table_info({});", quote_identifier(table))
}
