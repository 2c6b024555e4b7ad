//! # Common Test Utilities
//!
//! `TestApp` spawns the real router on a random port over the seeded in-memory
//! database, with the scripted mock model and the hashed mock embedder standing
//! in for the external services.

// Not every helper is used by every test file.
#![allow(unused)]

use anyhow::Result;
use nlsql::{
    config::{EmbeddingConfig, EngineConfig, ProviderConfig, ProviderKind},
    providers::ai::Embedder,
    QueryOrchestrator,
};
use nlsql_server::{config::AppConfig, router, state::AppState};
use nlsql_test_utils::{MockAiProvider, MockEmbedder, TestSetup};
use reqwest::Client;
use std::{collections::HashMap, sync::Arc, sync::Once};
use tempfile::TempDir;
use tokio::{net::TcpListener, task::JoinHandle};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
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

fn app_config(dir: &TempDir) -> AppConfig {
    let mut providers = HashMap::new();
    providers.insert(
        "mock".to_string(),
        ProviderConfig {
            provider: ProviderKind::Local,
            api_url: Some("http://127.0.0.1:0/v1/chat/completions".to_string()),
            api_key: None,
            model_name: "mock-chat-model".to_string(),
        },
    );
    AppConfig {
        port: 0,
        db_url: ":memory:".to_string(),
        active_provider: "mock".to_string(),
        providers,
        embedding: EmbeddingConfig {
            api_url: "http://127.0.0.1:0/v1/embeddings".to_string(),
            model_name: "mock-embedder".to_string(),
            api_key: None,
            dimension: 64,
        },
        engine: EngineConfig {
            cache_dir: dir.path().join("cache"),
            data_dir: dir.path().join("data"),
            ..Default::default()
        },
    }
}

/// A harness for end-to-end testing of the Axum server.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub provider: MockAiProvider,
    pub embedder: MockEmbedder,
    pub app_state: AppState,
    _dir: TempDir,
    _server_handle: JoinHandle<()>,
}

impl TestApp {
    /// Spawns the application server with `provider` as the language model.
    pub async fn spawn(provider: MockAiProvider) -> Result<Self> {
        setup_tracing();
        let dir = tempfile::tempdir()?;
        let config = app_config(&dir);
        let embedder = MockEmbedder::default();

        let setup = TestSetup::new().await?;
        let shared_embedder: Arc<dyn Embedder> = Arc::new(embedder.clone());
        let orchestrator = QueryOrchestrator::new(
            config.engine.clone(),
            Arc::new(setup.source),
            Arc::new(provider.clone()),
            shared_embedder,
        )
        .await?;
        let app_state = AppState {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = format!("http://{}", listener.local_addr()?);
        let app = router::create_router(app_state.clone());
        let server_handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            address,
            client: Client::new(),
            provider,
            embedder,
            app_state,
            _dir: dir,
            _server_handle: server_handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._server_handle.abort();
    }
}
