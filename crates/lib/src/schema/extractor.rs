//! # Schema Extractor
//!
//! Reads catalog metadata and a handful of sample rows from a data source. Table
//! names come from catalog introspection, never from user input.

use crate::{
    errors::DataSourceError,
    providers::db::DataSource,
    types::{ColumnInfo, SampleData},
};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SchemaExtractor {
    sample_rows: usize,
}

impl SchemaExtractor {
    pub fn new(sample_rows: usize) -> Self {
        Self { sample_rows }
    }

    /// Produces the raw schema text and per-table sample rows.
    ///
    /// A failure to sample a table is not fatal: that table gets an empty sample set.
    pub async fn extract(
        &self,
        source: &dyn DataSource,
    ) -> Result<(String, SampleData), DataSourceError> {
        let tables = source.list_tables().await?;
        let mut raw_schema = String::from("Database Schema:\n\n");
        let mut sample_data = SampleData::new();

        for table in &tables {
            let columns = source.table_columns(table).await?;
            raw_schema.push_str(&render_table(table, &columns));

            let rows = match source.sample_rows(table, self.sample_rows).await {
                Ok(result) => result.rows,
                Err(e) => {
                    warn!(table = %table, error = %e, "Could not sample table, continuing without rows");
                    Vec::new()
                }
            };
            sample_data.insert(table.clone(), rows);
        }

        info!(tables = tables.len(), "Extracted raw schema");
        Ok((raw_schema, sample_data))
    }
}

/// Renders one table block:
///
/// ```text
/// Table: customers
///   - id (INTEGER) PRIMARY KEY
///   - name (TEXT) NOT NULL
/// ```
pub fn render_table(table: &str, columns: &[ColumnInfo]) -> String {
    let mut out = format!("Table: {table}\n");
    for column in columns {
        out.push_str(&format!("  - {} ({})", column.name, column.data_type));
        if column.primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if column.not_null {
            out.push_str(" NOT NULL");
        }
        out.push('\n');
    }
    out.push('\n');
    out
}
