use thiserror::Error;

/// Errors raised by a generation capability (Gemini, local OpenAI-compatible models).
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to AI provider: {0}")]
    Request(reqwest::Error),
    #[error("Failed to deserialize AI provider response: {0}")]
    Deserialization(reqwest::Error),
    #[error("AI provider returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("AI provider call timed out after {0} seconds")]
    Timeout(u64),
    #[error("AI provider returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("AI provider failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<AiError> },
    #[error("AI provider is not configured: {0}")]
    MissingProvider(String),
}

impl AiError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Network failures, timeouts, rate limits (429) and server errors (5xx) are
    /// transient. Client errors and malformed payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Request(_) | AiError::Timeout(_) => true,
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A statement rejected by the SQL safety gate. The message names the rule that fired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyError {
    #[error("Write operation attempted without approval.")]
    WriteNotApproved,
    #[error("Banned token detected: {0}")]
    BannedToken(String),
    #[error("Write operations are disabled by policy.")]
    WritesDisabled,
}

/// Errors raised by a data source connection.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Data source connection error: {0}")]
    Connection(String),
    #[error("Database error: {0}")]
    Execution(String),
    #[error(transparent)]
    Safety(#[from] SafetyError),
    #[error("Unknown table: {0}")]
    UnknownTable(String),
}

/// Errors raised by the on-disk schema artifact cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to persist cache file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Errors raised while building the schema artifacts for a data source.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema extraction failed: {0}")]
    Extraction(#[from] DataSourceError),
    #[error("Schema analysis failed: {0}")]
    Analysis(AiError),
    #[error("Data dictionary generation failed: {0}")]
    Documentation(AiError),
    #[error("Could not parse structured schema: {0}")]
    Parse(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors raised by the example index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] AiError),
    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Index serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to persist index file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Example store is corrupt: {0}")]
    Corrupt(String),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors raised by a tool invoked by the model. They are sent back to the model
/// as an error payload rather than raised to the caller.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid input for tool '{tool}': {message}")]
    InvalidInput { tool: String, message: String },
    #[error(transparent)]
    Safety(#[from] SafetyError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

/// The top-level error type surfaced by the orchestrator and the server.
#[derive(Error, Debug)]
pub enum NlSqlError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Safety(#[from] SafetyError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("Failed to serialize result: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}
