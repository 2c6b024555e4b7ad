//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup: the configured AI provider and embedder, the
//! SQLite data source, and the query orchestrator that ties them together.

use crate::config::AppConfig;
use nlsql::{
    providers::{
        ai::{AiProvider, Embedder},
        db::SqliteSource,
        factory::{create_embedder, create_provider},
    },
    QueryOrchestrator,
};
use std::sync::Arc;
use tracing::info;

/// The shared application state, accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration, loaded from `config.yml`.
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<QueryOrchestrator>,
}

/// Builds the shared application state from the configuration.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let provider_config = config.active_provider_config()?;
    let ai_provider: Arc<dyn AiProvider> =
        Arc::from(create_provider(provider_config, &config.engine.retry)?);
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);

    let source = SqliteSource::new(&config.db_url).await?;
    info!(
        db_url = %config.db_url,
        provider = %config.active_provider,
        "Opened data source"
    );

    let orchestrator =
        QueryOrchestrator::new(config.engine.clone(), Arc::new(source), ai_provider, embedder)
            .await?;

    Ok(AppState {
        config: Arc::new(config),
        orchestrator: Arc::new(orchestrator),
    })
}
