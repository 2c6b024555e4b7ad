//! # API Payloads
//!
//! Request and response bodies for the HTTP routes. Responses wrap the library
//! types and add the derived fields callers expect, such as `row_count`.

use nlsql::{
    agent::AgentRun,
    constants::DEFAULT_EXAMPLE_COUNT,
    providers::ai::ChatMessage,
    schema::{CacheInfo, PipelineStage},
    ConversationTurn, Example, QueryResult, SchemaInfo, SqlExecution,
};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_example_count() -> usize {
    DEFAULT_EXAMPLE_COUNT
}

#[derive(Deserialize, Debug)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_true")]
    pub include_explanation: bool,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub result: QueryResult,
    pub row_count: usize,
}

impl From<QueryResult> for QueryResponse {
    fn from(result: QueryResult) -> Self {
        Self {
            row_count: result.row_count(),
            result,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ExecuteRequest {
    pub sql: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ExecuteResponse {
    #[serde(flatten)]
    pub execution: SqlExecution,
    pub row_count: usize,
}

impl From<SqlExecution> for ExecuteResponse {
    fn from(execution: SqlExecution) -> Self {
        Self {
            row_count: execution.results.as_ref().map_or(0, Vec::len),
            execution,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub tables_count: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TablesResponse {
    pub tables: Vec<String>,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SchemaResponse {
    pub schema: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct SchemaInitializeRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SchemaInitializeResponse {
    pub success: bool,
    pub message: String,
    pub data: SchemaInfo,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CacheInfoResponse {
    #[serde(flatten)]
    pub cache: CacheInfo,
    pub stage: PipelineStage,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ExamplesResponse {
    pub examples: Vec<Example>,
    pub count: usize,
}

#[derive(Deserialize, Debug)]
pub struct GenerateExamplesRequest {
    #[serde(default = "default_example_count")]
    pub count: usize,
}

impl Default for GenerateExamplesRequest {
    fn default() -> Self {
        Self {
            count: default_example_count(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct AgentRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AgentResponse {
    pub reply: String,
    pub iterations: usize,
    pub messages: Vec<ChatMessage>,
}

impl From<AgentRun> for AgentResponse {
    fn from(run: AgentRun) -> Self {
        Self {
            reply: run.reply(),
            iterations: run.iterations,
            messages: run.messages,
        }
    }
}
