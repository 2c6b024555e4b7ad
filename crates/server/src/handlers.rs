use super::{
    errors::AppError,
    state::AppState,
    types::{
        AgentRequest, AgentResponse, CacheInfoResponse, ExamplesResponse, ExecuteRequest,
        ExecuteResponse, GenerateExamplesRequest, HealthResponse, MessageResponse, QueryRequest,
        QueryResponse, SchemaInitializeRequest, SchemaInitializeResponse, SchemaResponse,
        TablesResponse,
    },
};
use axum::{extract::State, Json};
use nlsql::{rag::RagStats, DatabaseInfo, ExampleGeneration};
use tracing::info;

// --- Route Handlers ---

pub async fn root() -> &'static str {
    "nlsql server is running."
}

/// Reports healthy only when the data source answers a catalog query.
pub async fn health_check(
    State(app_state): State<AppState>,
) -> Result<Json<HealthResponse>, AppError> {
    let tables = app_state
        .orchestrator
        .list_tables()
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: "connected".to_string(),
        tables_count: tables.len(),
    }))
}

/// Turns a natural-language question into SQL, runs it, and optionally explains it.
///
/// Pipeline failures are reported in the body with `success = false`.
pub async fn query_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Json<QueryResponse> {
    info!(
        query = %payload.query,
        history = payload.conversation_history.len(),
        "Received natural-language query"
    );
    let result = app_state
        .orchestrator
        .process(
            &payload.query,
            payload.include_explanation,
            &payload.conversation_history,
        )
        .await;
    Json(result.into())
}

pub async fn execute_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<ExecuteRequest>,
) -> Json<ExecuteResponse> {
    info!(sql = %payload.sql, "Received direct SQL");
    let execution = app_state.orchestrator.execute_direct_sql(&payload.sql).await;
    Json(execution.into())
}

pub async fn database_info_handler(
    State(app_state): State<AppState>,
) -> Result<Json<DatabaseInfo>, AppError> {
    Ok(Json(app_state.orchestrator.database_info().await?))
}

pub async fn database_tables_handler(
    State(app_state): State<AppState>,
) -> Result<Json<TablesResponse>, AppError> {
    let tables = app_state.orchestrator.list_tables().await?;
    Ok(Json(TablesResponse {
        count: tables.len(),
        tables,
    }))
}

pub async fn database_schema_handler(
    State(app_state): State<AppState>,
) -> Result<Json<SchemaResponse>, AppError> {
    let schema = app_state.orchestrator.raw_schema().await?;
    Ok(Json(SchemaResponse { schema }))
}

/// Builds the schema artifacts, or rebuilds them all with `force_refresh`.
///
/// The body is optional; an empty request initializes without refreshing.
pub async fn schema_initialize_handler(
    State(app_state): State<AppState>,
    payload: Option<Json<SchemaInitializeRequest>>,
) -> Result<Json<SchemaInitializeResponse>, AppError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let info = app_state
        .orchestrator
        .initialize_schema(request.force_refresh)
        .await?;

    let message = if request.force_refresh {
        "Schema refreshed successfully"
    } else {
        "Schema initialized successfully"
    };
    Ok(Json(SchemaInitializeResponse {
        success: true,
        message: message.to_string(),
        data: info.as_ref().clone(),
    }))
}

pub async fn schema_cache_info_handler(
    State(app_state): State<AppState>,
) -> Result<Json<CacheInfoResponse>, AppError> {
    let cache = app_state.orchestrator.cache_info().await?;
    Ok(Json(CacheInfoResponse {
        cache,
        stage: app_state.orchestrator.schema_stage(),
    }))
}

pub async fn rag_info_handler(State(app_state): State<AppState>) -> Json<RagStats> {
    Json(app_state.orchestrator.rag_stats().await)
}

pub async fn rag_examples_handler(State(app_state): State<AppState>) -> Json<ExamplesResponse> {
    let examples = app_state.orchestrator.rag_examples().await;
    Json(ExamplesResponse {
        count: examples.len(),
        examples,
    })
}

/// Replaces the stored examples with a freshly generated set.
pub async fn rag_generate_handler(
    State(app_state): State<AppState>,
    payload: Option<Json<GenerateExamplesRequest>>,
) -> Result<Json<ExampleGeneration>, AppError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    info!(count = request.count, "Generating stored examples");
    Ok(Json(
        app_state.orchestrator.generate_examples(request.count).await?,
    ))
}

pub async fn rag_clear_handler(
    State(app_state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    app_state.orchestrator.clear_examples().await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Stored examples cleared".to_string(),
    }))
}

/// Lets the model answer by calling the SQL tools itself.
pub async fn agent_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<AgentRequest>,
) -> Result<Json<AgentResponse>, AppError> {
    let run = app_state
        .orchestrator
        .run_agent(&payload.question, &payload.conversation_history)
        .await?;
    Ok(Json(run.into()))
}
