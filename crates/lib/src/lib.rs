//! # Natural Language to SQL
//!
//! This crate turns natural-language questions into read-only SQL, runs it against a
//! relational data source and optionally explains the result.
//!
//! Generation is grounded in three schema artifacts (raw schema with sample rows, a
//! structured schema and a data dictionary) that are cached per content fingerprint
//! of the data source, and in stored question/SQL examples retrieved by embedding
//! similarity. Every statement passes a heuristic safety gate before execution.
//!
//! The entry point is [`QueryOrchestrator`].

pub mod agent;
pub mod config;
pub mod constants;
pub mod errors;
pub mod orchestrator;
pub mod parsing;
pub mod prompts;
pub mod providers;
pub mod rag;
pub mod safety;
pub mod schema;
pub mod types;

pub use agent::{agent_multistep, agent_step, AgentRun, SqlTools, ToolExecutor};
pub use config::{EngineConfig, GenerationConfig, GenerationParams, RetryConfig};
pub use errors::{
    AiError, CacheError, DataSourceError, IndexError, NlSqlError, SafetyError, SchemaError,
    ToolError,
};
pub use orchestrator::QueryOrchestrator;
pub use safety::SqlSafetyGate;
pub use types::{
    ConversationTurn, DatabaseInfo, Example, ExampleGeneration, QueryResult, Role, SchemaInfo,
    SqlExecution,
};
