#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Tracing setup plus helpers that prime the mock model with the replies each
//! component expects.

use dotenvy::dotenv;
use nlsql::{config::EngineConfig, providers::ai::Embedder, QueryOrchestrator};
use nlsql_test_utils::{MockAiProvider, MockEmbedder, TestSetup};
use std::{path::Path, sync::Arc, sync::Once};

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// Unique substrings of each system prompt.
pub const ANALYSIS_KEY: &str = "You are a database analyst";
pub const DICTIONARY_KEY: &str = "technical writer producing a data dictionary";
pub const SQL_KEY: &str = "You are a SQL expert";
pub const EXPLANATION_KEY: &str = "You explain the results of SQL queries";
pub const EXAMPLES_KEY: &str = "You generate training examples";
pub const AGENT_KEY: &str = "database analysis assistant";

pub const STRUCTURED_SCHEMA: &str = r#"```json
{"tables": {"customers": {"description": "People who place orders", "columns": {"id": "identifier"}}}, "relationships": []}
```"#;

pub const DATA_DICTIONARY: &str = "customers.id: unique customer identifier.";

/// A mock model primed for both enrichment stages.
pub fn schema_ready_provider() -> MockAiProvider {
    let provider = MockAiProvider::new();
    provider.add_response(ANALYSIS_KEY, STRUCTURED_SCHEMA);
    provider.add_response(DICTIONARY_KEY, DATA_DICTIONARY);
    provider
}

pub fn engine_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        cache_dir: dir.join("cache"),
        data_dir: dir.join("data"),
        ..Default::default()
    }
}

/// An orchestrator over the seeded in-memory database.
pub async fn orchestrator(
    dir: &Path,
    provider: &MockAiProvider,
    embedder: &MockEmbedder,
) -> anyhow::Result<QueryOrchestrator> {
    orchestrator_with_config(engine_config(dir), provider, embedder).await
}

pub async fn orchestrator_with_config(
    config: EngineConfig,
    provider: &MockAiProvider,
    embedder: &MockEmbedder,
) -> anyhow::Result<QueryOrchestrator> {
    let setup = TestSetup::new().await?;
    let embedder: Arc<dyn Embedder> = Arc::new(embedder.clone());
    Ok(QueryOrchestrator::new(
        config,
        Arc::new(setup.source),
        Arc::new(provider.clone()),
        embedder,
    )
    .await?)
}
