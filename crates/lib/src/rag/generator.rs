//! # Example Generator
//!
//! Asks the model for a batch of question/SQL pairs that cover the schema. When
//! the model fails or returns nothing usable, simple templated examples are built
//! from the table names instead.

use crate::{
    config::GenerationParams,
    errors::NlSqlError,
    parsing::strip_code_fence,
    prompts::examples::{example_generation_user_prompt, EXAMPLE_GENERATION_SYSTEM_PROMPT},
    providers::ai::{AiProvider, ChatMessage, ChatRequest},
    types::{Example, SampleData},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const FALLBACK_TABLE_LIMIT: usize = 10;
const FALLBACK_EXAMPLE_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct ExampleGenerator {
    ai_provider: Arc<dyn AiProvider>,
    params: GenerationParams,
}

impl ExampleGenerator {
    pub fn new(ai_provider: Arc<dyn AiProvider>, params: GenerationParams) -> Self {
        Self {
            ai_provider,
            params,
        }
    }

    /// Generates up to `count` examples. The flag is true when the templated
    /// fallback was used.
    pub async fn generate(
        &self,
        count: usize,
        dialect: &str,
        raw_schema: &str,
        sample_data: &SampleData,
        tables: &[String],
    ) -> (Vec<Example>, bool) {
        info!(count, "Generating example queries");
        match self
            .generate_with_model(count, dialect, raw_schema, sample_data)
            .await
        {
            Ok(examples) if !examples.is_empty() => {
                if examples.len() < count {
                    warn!(
                        generated = examples.len(),
                        expected = count,
                        "Model produced fewer examples than requested"
                    );
                }
                (examples, false)
            }
            Ok(_) => {
                warn!("Model produced no valid examples, using fallback");
                (fallback_examples(tables), true)
            }
            Err(e) => {
                error!(error = %e, "Error generating examples, using fallback");
                (fallback_examples(tables), true)
            }
        }
    }

    async fn generate_with_model(
        &self,
        count: usize,
        dialect: &str,
        raw_schema: &str,
        sample_data: &SampleData,
    ) -> Result<Vec<Example>, NlSqlError> {
        let user_prompt = example_generation_user_prompt(count, dialect, raw_schema, sample_data);
        debug!("--> Requesting {} examples from AI", count);

        let request = ChatRequest::new(
            EXAMPLE_GENERATION_SYSTEM_PROMPT,
            vec![ChatMessage::user_text(user_prompt)],
        )
        .with_params(self.params);
        let response = self.ai_provider.chat(&request).await?.text();

        debug!("<-- Example generation response ({} chars)", response.len());
        let mut examples = parse_examples(&response)?;
        examples.truncate(count);
        info!(count = examples.len(), "Generated valid examples");
        Ok(examples)
    }
}

/// Parses a JSON array of `{natural_language_query, sql_query}` objects, keeping
/// only well-formed entries and stripping a trailing `;` from each SQL string.
pub fn parse_examples(response: &str) -> Result<Vec<Example>, NlSqlError> {
    let body = strip_code_fence(response, "json")?;
    let entries: Vec<Value> = serde_json::from_str(&body)?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let question = entry.get("natural_language_query")?.as_str()?.trim();
            let sql = entry.get("sql_query")?.as_str()?.trim();
            let sql = sql.strip_suffix(';').map(str::trim).unwrap_or(sql);
            if question.is_empty() || sql.is_empty() {
                return None;
            }
            Some(Example::new(question, sql))
        })
        .collect())
}

/// Two templated examples per table for the first ten tables.
pub fn fallback_examples(tables: &[String]) -> Vec<Example> {
    info!("Using fallback example generation");
    let mut examples: Vec<Example> = tables
        .iter()
        .take(FALLBACK_TABLE_LIMIT)
        .flat_map(|table| {
            [
                Example::new(
                    format!("Show all {table}"),
                    format!("SELECT * FROM {table} LIMIT 100"),
                ),
                Example::new(
                    format!("How many {table} are there?"),
                    format!("SELECT COUNT(*) as count FROM {table}"),
                ),
            ]
        })
        .collect();
    examples.truncate(FALLBACK_EXAMPLE_LIMIT);
    examples
}
