//! # Schema Enrichment Prompts

use crate::types::SampleData;
use serde_json::Value;

/// System prompt for structural analysis of a raw schema.
pub const SCHEMA_ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a database analyst. You study raw database schemas and sample rows and describe their structure as JSON.
Return ONLY a JSON object, no markdown and no commentary, with this shape:
{
  "tables": {
    "<table>": {
      "purpose": "what the table stores",
      "columns": {
        "<column>": {"type": "declared type", "semantics": "what the values mean", "primary_key": false, "nullable": true}
      }
    }
  },
  "relationships": [
    {"from": "<table>.<column>", "to": "<table>.<column>", "kind": "many-to-one"}
  ]
}"#;

/// Placeholders: `{schema}`, `{samples}`
pub const SCHEMA_ANALYSIS_USER_PROMPT: &str = r#"{schema}
# Sample Data
{samples}

Analyze this database and return the structured JSON description."#;

/// System prompt for writing the data dictionary.
pub const DATA_DICTIONARY_SYSTEM_PROMPT: &str = r#"You are a technical writer producing a data dictionary for analysts who will query this database.
For every table, document each column: its meaning, its typical values, and any business rules you can infer (valid ranges, status codes, units, how tables join).
Write plain text with one section per table. Do not invent tables or columns."#;

/// Placeholders: `{structured_schema}`, `{samples}`
pub const DATA_DICTIONARY_USER_PROMPT: &str = r#"# Structured Schema
{structured_schema}

# Sample Data
{samples}

Write the data dictionary."#;

fn render_samples(sample_data: &SampleData) -> String {
    serde_json::to_string_pretty(sample_data).unwrap_or_else(|_| "{}".to_string())
}

pub fn schema_analysis_user_prompt(raw_schema: &str, sample_data: &SampleData) -> String {
    SCHEMA_ANALYSIS_USER_PROMPT
        .replace("{schema}", raw_schema)
        .replace("{samples}", &render_samples(sample_data))
}

pub fn data_dictionary_user_prompt(structured_schema: &Value, sample_data: &SampleData) -> String {
    let structured =
        serde_json::to_string_pretty(structured_schema).unwrap_or_else(|_| "{}".to_string());
    DATA_DICTIONARY_USER_PROMPT
        .replace("{structured_schema}", &structured)
        .replace("{samples}", &render_samples(sample_data))
}
