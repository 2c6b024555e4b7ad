//! # Query Generation Prompts
//!
//! Templates for turning a question into SQL and for explaining the outcome.

use crate::types::{Example, Row};

// --- Query Generation ---

/// System prompt for SQL generation.
///
/// Placeholders: `{dialect}`
pub const SQL_GENERATION_SYSTEM_PROMPT: &str = r#"You are a SQL expert. Given a database schema, a data dictionary, and a natural language question, generate a valid {dialect} query.
Important instructions:
1. Generate ONLY the SQL query, no explanations
2. Use proper {dialect} syntax
3. Return only SELECT queries (no INSERT, UPDATE, DELETE, DROP, etc.)
4. Make sure the query is safe and optimized
5. Use proper JOIN clauses when needed
6. Include appropriate WHERE clauses to filter results
7. Return ONLY the SQL query without any markdown formatting, backticks, or code blocks"#;

/// User prompt for SQL generation.
///
/// Placeholders: `{schema}`, `{data_dictionary}`, `{examples}`, `{question}`
pub const SQL_GENERATION_USER_PROMPT: &str = r#"{schema}
# Data Dictionary
{data_dictionary}
{examples}
User Question: {question}

SQL Query:"#;

/// Renders retrieved examples as question/SQL pairs. Empty input renders nothing.
pub fn format_examples(examples: &[Example]) -> String {
    if examples.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n# Similar Examples\n");
    for (i, example) in examples.iter().enumerate() {
        out.push_str(&format!(
            "Example {}:\nQuestion: {}\nSQL: {}\n\n",
            i + 1,
            example.natural_language_query,
            example.sql_query
        ));
    }
    out
}

pub fn sql_generation_system_prompt(dialect: &str) -> String {
    SQL_GENERATION_SYSTEM_PROMPT.replace("{dialect}", dialect)
}

pub fn sql_generation_user_prompt(
    question: &str,
    raw_schema: &str,
    data_dictionary: &str,
    examples: &[Example],
) -> String {
    SQL_GENERATION_USER_PROMPT
        .replace("{schema}", raw_schema)
        .replace("{data_dictionary}", data_dictionary)
        .replace("{examples}", &format_examples(examples))
        .replace("{question}", question)
}

// --- Result Explanation ---

pub const EXPLANATION_SYSTEM_PROMPT: &str = "You explain the results of SQL queries to non-technical users. Be concise and concrete.";

/// Placeholders: `{question}`, `{sql}`, `{results}`
pub const EXPLANATION_SUCCESS_PROMPT: &str = r#"The user asked: "{question}"
We ran this SQL query: {sql}
Results: {results}

Please provide a natural language summary of the results in 2-3 sentences."#;

/// Placeholders: `{question}`, `{sql}`, `{error}`
pub const EXPLANATION_FAILURE_PROMPT: &str = r#"The user asked: "{question}"
We generated this SQL query: {sql}
But it resulted in an error: {error}

Please explain what went wrong in simple terms and suggest what might be needed."#;

pub fn explanation_success_prompt(question: &str, sql: &str, results: &[Row]) -> String {
    let results = serde_json::to_string_pretty(results).unwrap_or_else(|_| "[]".to_string());
    EXPLANATION_SUCCESS_PROMPT
        .replace("{question}", question)
        .replace("{sql}", sql)
        .replace("{results}", &results)
}

pub fn explanation_failure_prompt(question: &str, sql: &str, error: &str) -> String {
    EXPLANATION_FAILURE_PROMPT
        .replace("{question}", question)
        .replace("{sql}", sql)
        .replace("{error}", error)
}
