use crate::{
    errors::DataSourceError,
    types::{ColumnInfo, QueryParams, QueryRows},
};
use async_trait::async_trait;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::PathBuf;

/// What a data source is, for the purpose of fingerprinting its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceIdentity {
    /// A database backed by a file on disk. Its bytes are hashed.
    File { path: PathBuf, logical_name: String },
    /// A database with no file (in-memory, remote). The id string is hashed.
    Opaque { id: String, logical_name: String },
}

impl SourceIdentity {
    /// The human-readable name used as the cache key prefix.
    pub fn logical_name(&self) -> &str {
        match self {
            SourceIdentity::File { logical_name, .. } | SourceIdentity::Opaque { logical_name, .. } => {
                logical_name
            }
        }
    }
}

/// Quotes an identifier for interpolation into SQL, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// A trait for interacting with a relational data source.
///
/// Every call borrows a connection for its own duration; implementations must
/// release it on every exit path.
#[async_trait]
pub trait DataSource: Send + Sync + DynClone + Debug {
    /// Returns the name of the storage provider (e.g., "SQLite").
    fn name(&self) -> &str;

    /// The SQL dialect the model should write (e.g., "SQLite").
    fn dialect(&self) -> &str;

    fn identity(&self) -> SourceIdentity;

    /// Lists user tables, excluding system catalogs.
    async fn list_tables(&self) -> Result<Vec<String>, DataSourceError>;

    /// Column metadata for a table, in declaration order.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DataSourceError>;

    /// Runs a statement and returns its rows and ordered column names.
    async fn query(&self, sql: &str, params: &QueryParams) -> Result<QueryRows, DataSourceError>;

    /// Runs a write statement and returns the number of affected rows.
    async fn execute_write(&self, sql: &str, params: &QueryParams)
        -> Result<u64, DataSourceError>;

    /// Fetches up to `limit` rows from a catalog-sourced table name.
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryRows, DataSourceError> {
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
        self.query(&sql, &QueryParams::new()).await
    }

    /// Counts the rows of a catalog-sourced table name.
    async fn count_rows(&self, table: &str) -> Result<u64, DataSourceError> {
        let sql = format!("SELECT COUNT(*) AS count FROM {}", quote_identifier(table));
        let result = self.query(&sql, &QueryParams::new()).await?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }
}

dyn_clone::clone_trait_object!(DataSource);
