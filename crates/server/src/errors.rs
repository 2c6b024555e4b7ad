use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nlsql::{DataSourceError, NlSqlError, SchemaError};
use serde_json::json;
use tracing::error;

/// A custom error type for the server application.
///
/// Request-level failures become a JSON `{ "error": ... }` body. Failures of a
/// natural-language query are not errors here: they travel inside the query
/// result with `success = false`.
pub enum AppError {
    /// Errors originating from the `nlsql` library.
    Engine(NlSqlError),
    /// The data source could not be reached.
    Unavailable(String),
    /// Generic internal server errors.
    Internal(anyhow::Error),
}

impl From<NlSqlError> for AppError {
    fn from(err: NlSqlError) -> Self {
        AppError::Engine(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

fn engine_status(err: &NlSqlError) -> StatusCode {
    match err {
        NlSqlError::Ai(_) => StatusCode::BAD_GATEWAY,
        NlSqlError::Safety(_) => StatusCode::BAD_REQUEST,
        NlSqlError::DataSource(DataSourceError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
        NlSqlError::DataSource(DataSourceError::Safety(_))
        | NlSqlError::DataSource(DataSourceError::UnknownTable(_))
        | NlSqlError::DataSource(DataSourceError::Execution(_)) => StatusCode::BAD_REQUEST,
        NlSqlError::Schema(SchemaError::Analysis(_))
        | NlSqlError::Schema(SchemaError::Documentation(_))
        | NlSqlError::Schema(SchemaError::Parse(_)) => StatusCode::BAD_GATEWAY,
        NlSqlError::Schema(SchemaError::Extraction(_)) => StatusCode::SERVICE_UNAVAILABLE,
        NlSqlError::Index(nlsql::IndexError::Embedding(_)) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::Engine(err) => {
                error!("NlSqlError: {:?}", err);
                (engine_status(&err), err.to_string())
            }
            AppError::Unavailable(message) => {
                error!("Service unhealthy: {}", message);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("Service unhealthy: {message}"),
                )
            }
            AppError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status_code, body).into_response()
    }
}
