use crate::{
    errors::DataSourceError,
    providers::db::storage::{DataSource, SourceIdentity},
    types::{ColumnInfo, QueryParams, QueryRows, Row},
};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    fmt::{self, Debug},
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use turso::{Connection, Database, Value as TursoValue};

mod sql;

const IN_MEMORY: &str = ":memory:";

/// A data source over a local SQLite database using Turso.
///
/// This source holds a `Database` instance. When cloned, it shares the same
/// underlying database, so an in-memory database created once can be handed to
/// several components.
#[derive(Clone)]
pub struct SqliteSource {
    /// The Turso database instance. It's cloneable and thread-safe.
    pub db: Database,
    path: Option<PathBuf>,
    logical_name: String,
}

impl SqliteSource {
    /// Opens a database from a file path, or `":memory:"` for an isolated
    /// in-memory database.
    pub async fn new(db_path: &str) -> Result<Self, DataSourceError> {
        let db = turso::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| DataSourceError::Connection(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DataSourceError::Connection(e.to_string()))?;
        // `query` rather than `execute`: the pragma returns a row.
        conn.query(sql::ENABLE_WAL, ())
            .await
            .map_err(|e| DataSourceError::Connection(e.to_string()))?;

        let (path, logical_name) = if db_path == IN_MEMORY {
            (None, "memory".to_string())
        } else {
            let path = PathBuf::from(db_path);
            let logical_name = logical_name_for(&path);
            (Some(path), logical_name)
        };

        info!(db_path = %db_path, logical_name = %logical_name, "Opened SQLite data source");

        Ok(Self {
            db,
            path,
            logical_name,
        })
    }

    /// Overrides the logical name used as the cache key prefix.
    pub fn with_logical_name(mut self, logical_name: impl Into<String>) -> Self {
        self.logical_name = logical_name.into();
        self
    }

    /// Executes a batch of `;`-separated statements, e.g. to seed fixtures.
    pub async fn initialize_with_data(&self, init_sql: &str) -> Result<(), DataSourceError> {
        let conn = self.connect()?;
        for statement in init_sql.split(';').filter(|s| !s.trim().is_empty()) {
            conn.execute(statement, ())
                .await
                .map_err(|e| DataSourceError::Execution(e.to_string()))?;
        }
        Ok(())
    }

    fn connect(&self) -> Result<Connection, DataSourceError> {
        self.db
            .connect()
            .map_err(|e| DataSourceError::Connection(e.to_string()))
    }
}

fn logical_name_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("database")
        .to_string()
}

impl Debug for SqliteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteSource")
            .field("path", &self.path)
            .field("logical_name", &self.logical_name)
            .finish_non_exhaustive()
    }
}

impl AsRef<Database> for SqliteSource {
    fn as_ref(&self) -> &Database {
        &self.db
    }
}

/// Converts a Turso value to a serde_json::Value.
pub(crate) fn turso_value_to_json(v: TursoValue) -> Value {
    match v {
        TursoValue::Null => Value::Null,
        TursoValue::Integer(i) => Value::Number(i.into()),
        TursoValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        TursoValue::Text(s) => Value::String(s),
        TursoValue::Blob(_) => Value::String("<blob>".to_string()),
    }
}

/// Converts a JSON parameter to the closest Turso value.
pub(crate) fn json_to_turso_value(v: &Value) -> TursoValue {
    match v {
        Value::Null => TursoValue::Null,
        Value::Bool(b) => TursoValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => TursoValue::Integer(i),
            None => n
                .as_f64()
                .map(TursoValue::Real)
                .unwrap_or(TursoValue::Null),
        },
        Value::String(s) => TursoValue::Text(s.clone()),
        other => TursoValue::Text(other.to_string()),
    }
}

/// Named parameters keyed as `:name`, the form SQLite placeholders use.
fn named_params(params: &QueryParams) -> Vec<(String, TursoValue)> {
    params
        .iter()
        .map(|(name, value)| {
            let key = if name.starts_with([':', '@', '$']) {
                name.clone()
            } else {
                format!(":{name}")
            };
            (key, json_to_turso_value(value))
        })
        .collect()
}

#[async_trait]
impl DataSource for SqliteSource {
    fn name(&self) -> &str {
        "SQLite"
    }

    fn dialect(&self) -> &str {
        "SQLite"
    }

    fn identity(&self) -> SourceIdentity {
        match &self.path {
            Some(path) => SourceIdentity::File {
                path: path.clone(),
                logical_name: self.logical_name.clone(),
            },
            None => SourceIdentity::Opaque {
                id: format!("sqlite:{IN_MEMORY}:{}", self.logical_name),
                logical_name: self.logical_name.clone(),
            },
        }
    }

    async fn list_tables(&self) -> Result<Vec<String>, DataSourceError> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(sql::LIST_TABLES, ())
            .await
            .map_err(|e| DataSourceError::Execution(e.to_string()))?;

        let mut tables = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DataSourceError::Execution(e.to_string()))?
        {
            if let Ok(TursoValue::Text(name)) = row.get_value(0) {
                tables.push(name);
            }
        }
        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DataSourceError> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(&sql::table_info(table), ())
            .await
            .map_err(|e| DataSourceError::Execution(e.to_string()))?;

        let mut columns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DataSourceError::Execution(e.to_string()))?
        {
            // PRAGMA table_info columns: cid, name, type, notnull, dflt_value, pk
            let name = match row.get_value(1) {
                Ok(TursoValue::Text(name)) => name,
                _ => continue,
            };
            let data_type = match row.get_value(2) {
                Ok(TursoValue::Text(t)) => t,
                _ => String::new(),
            };
            let not_null = matches!(row.get_value(3), Ok(TursoValue::Integer(n)) if n != 0);
            let primary_key = matches!(row.get_value(5), Ok(TursoValue::Integer(n)) if n > 0);
            columns.push(ColumnInfo {
                name,
                data_type,
                primary_key,
                not_null,
            });
        }

        if columns.is_empty() {
            return Err(DataSourceError::UnknownTable(table.to_string()));
        }
        Ok(columns)
    }

    async fn query(&self, sql: &str, params: &QueryParams) -> Result<QueryRows, DataSourceError> {
        debug!(sql = %sql, params = params.len(), "--> Executing SQLite query");

        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| DataSourceError::Execution(e.to_string()))?;

        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut rows = if params.is_empty() {
            stmt.query(()).await
        } else {
            stmt.query(named_params(params)).await
        }
        .map_err(|e| DataSourceError::Execution(e.to_string()))?;

        let mut results: Vec<Row> = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DataSourceError::Execution(e.to_string()))?
        {
            let mut row_map = Row::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row
                    .get_value(i)
                    .map_err(|e| DataSourceError::Execution(e.to_string()))?;
                row_map.insert(name.clone(), turso_value_to_json(value));
            }
            results.push(row_map);
        }

        debug!(rows = results.len(), "<-- SQLite query returned");
        Ok(QueryRows {
            columns,
            rows: results,
        })
    }

    async fn execute_write(
        &self,
        sql: &str,
        params: &QueryParams,
    ) -> Result<u64, DataSourceError> {
        debug!(sql = %sql, "--> Executing SQLite write");
        let conn = self.connect()?;
        let affected = if params.is_empty() {
            conn.execute(sql, ()).await
        } else {
            conn.execute(sql, named_params(params)).await
        }
        .map_err(|e| DataSourceError::Execution(e.to_string()))?;
        info!(affected, "SQLite write applied");
        Ok(affected)
    }
}
