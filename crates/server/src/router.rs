use super::{handlers, state::AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/query", post(handlers::query_handler))
        .route("/execute", post(handlers::execute_handler))
        .route("/database/info", get(handlers::database_info_handler))
        .route("/database/tables", get(handlers::database_tables_handler))
        .route("/database/schema", get(handlers::database_schema_handler))
        .route(
            "/schema/initialize",
            post(handlers::schema_initialize_handler),
        )
        .route(
            "/schema/cache-info",
            get(handlers::schema_cache_info_handler),
        )
        .route("/rag/info", get(handlers::rag_info_handler))
        .route(
            "/rag/examples",
            get(handlers::rag_examples_handler).delete(handlers::rag_clear_handler),
        )
        .route("/rag/generate", post(handlers::rag_generate_handler))
        .route("/agent", post(handlers::agent_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
