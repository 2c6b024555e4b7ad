use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Representative rows per table, captured alongside the raw schema.
///
/// A `BTreeMap` keeps the serialized form (and therefore prompts built from it)
/// in a stable table order.
pub type SampleData = BTreeMap<String, Vec<Row>>;

/// The speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of caller-owned conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A stored natural-language question paired with the SQL that answers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub natural_language_query: String,
    pub sql_query: String,
    /// Only present on examples returned from a similarity search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
}

impl Example {
    pub fn new(natural_language_query: impl Into<String>, sql_query: impl Into<String>) -> Self {
        Self {
            natural_language_query: natural_language_query.into(),
            sql_query: sql_query.into(),
            similarity_score: None,
        }
    }
}

/// Column metadata as reported by catalog introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub primary_key: bool,
    pub not_null: bool,
}

/// Rows and ordered column names returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Named query parameters, bound as `:name` placeholders.
pub type QueryParams = BTreeMap<String, Value>;

/// The complete set of schema artifacts for one data source fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub raw_schema: String,
    pub sample_data: SampleData,
    pub structured_schema: Value,
    pub data_dictionary: String,
}

/// The outcome of processing one natural-language request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub query: String,
    pub sql: Option<String>,
    pub results: Option<Vec<Row>>,
    pub columns: Option<Vec<String>>,
    pub explanation: Option<String>,
    pub error: Option<String>,
}

impl QueryResult {
    pub(crate) fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.results.as_ref().map_or(0, Vec::len)
    }
}

/// The outcome of executing caller-supplied SQL without the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlExecution {
    pub success: bool,
    pub sql: String,
    pub results: Option<Vec<Row>>,
    pub columns: Option<Vec<String>>,
    pub error: Option<String>,
}

/// A snapshot of the database structure with every derived artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub tables: Vec<String>,
    pub raw_schema: String,
    pub structured_schema: Value,
    pub data_dictionary: String,
    pub sample_data: SampleData,
}

/// Outcome of a bulk example regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleGeneration {
    pub num_examples: usize,
    pub examples: Vec<Example>,
    pub used_fallback: bool,
}
