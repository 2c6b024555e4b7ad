//! # Tool-Calling Agent
//!
//! The model is handed three database tools and decides itself when to call them:
//!
//! - `get_schema(include_counts?, tables?)`: tables and their columns.
//! - `run_sql(sql, params?, write?, row_limit=200)`: a gated statement.
//! - `sample_rows(table, limit=50)`: the first rows of a catalog table.
//!
//! Every tool invocation in a reply is executed and its result sent back keyed by
//! the invocation id. Unknown tools and failing tools produce an error payload for
//! the model instead of an error for the caller.

use crate::{
    constants::{DEFAULT_ROW_LIMIT, DEFAULT_SAMPLE_TOOL_LIMIT},
    errors::{AiError, DataSourceError, ToolError},
    providers::{
        ai::{AiProvider, ChatMessage, ChatRequest, ContentBlock, ToolOutcome, ToolSpec},
        db::{quote_identifier, DataSource},
    },
    safety::SqlSafetyGate,
    types::{QueryParams, Role},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maps a tool name and JSON input to a JSON result.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The tools this executor can run, as advertised to the model.
    fn specs(&self) -> Vec<ToolSpec>;

    async fn execute(&self, name: &str, input: &Value) -> Result<Value, ToolError>;
}

/// JSON schemas for the three database tools.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "get_schema".to_string(),
            description: "Return database schema with tables and columns. Optionally include row counts.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "include_counts": {"type": "boolean", "default": false},
                    "tables": {"type": "array", "items": {"type": "string"}}
                }
            }),
        },
        ToolSpec {
            name: "run_sql".to_string(),
            description: "Execute SQL. Defaults to read-only. Results truncated by row_limit.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string"},
                    "params": {"type": "object"},
                    "write": {"type": "boolean", "default": false},
                    "row_limit": {"type": "integer", "default": DEFAULT_ROW_LIMIT}
                },
                "required": ["sql"]
            }),
        },
        ToolSpec {
            name: "sample_rows".to_string(),
            description: "Return up to N rows from a table.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table": {"type": "string"},
                    "limit": {"type": "integer", "default": DEFAULT_SAMPLE_TOOL_LIMIT}
                },
                "required": ["table"]
            }),
        },
    ]
}

#[derive(Debug, Default, Deserialize)]
struct GetSchemaInput {
    #[serde(default)]
    include_counts: bool,
    #[serde(default)]
    tables: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RunSqlInput {
    sql: String,
    #[serde(default)]
    params: QueryParams,
    #[serde(default)]
    write: bool,
    #[serde(default = "default_row_limit")]
    row_limit: usize,
}

fn default_row_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

#[derive(Debug, Deserialize)]
struct SampleRowsInput {
    table: String,
    #[serde(default = "default_sample_limit")]
    limit: usize,
}

fn default_sample_limit() -> usize {
    DEFAULT_SAMPLE_TOOL_LIMIT
}

fn parse_input<T: DeserializeOwned>(tool: &str, input: &Value) -> Result<T, ToolError> {
    // Models sometimes send `null` for a tool without arguments.
    let input = if input.is_null() {
        Value::Object(Map::new())
    } else {
        input.clone()
    };
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// The database tools, backed by a data source and the safety gate.
#[derive(Debug, Clone)]
pub struct SqlTools {
    source: Arc<dyn DataSource>,
    gate: SqlSafetyGate,
}

impl SqlTools {
    pub fn new(source: Arc<dyn DataSource>, gate: SqlSafetyGate) -> Self {
        Self { source, gate }
    }

    /// Tables with their columns, optionally restricted to `tables` and with row counts.
    pub async fn get_schema(
        &self,
        include_counts: bool,
        tables: Option<&[String]>,
    ) -> Result<Value, ToolError> {
        let catalog = self.source.list_tables().await?;
        let selected: Vec<&String> = match tables {
            Some(wanted) if !wanted.is_empty() => {
                catalog.iter().filter(|t| wanted.contains(t)).collect()
            }
            _ => catalog.iter().collect(),
        };

        let mut out = Map::new();
        for table in selected {
            let columns: Vec<Value> = self
                .source
                .table_columns(table)
                .await?
                .into_iter()
                .map(|c| json!({ "column": c.name, "type": c.data_type }))
                .collect();
            let entry = if include_counts {
                let row_count = self.source.count_rows(table).await?;
                json!({ "columns": columns, "row_count": row_count })
            } else {
                Value::Array(columns)
            };
            out.insert(table.clone(), entry);
        }
        Ok(Value::Object(out))
    }

    /// Runs a statement through the gate. Reads return `{"rows": [...]}`,
    /// writes return `{"rowcount": n}`.
    pub async fn run_sql(
        &self,
        sql: &str,
        params: &QueryParams,
        write: bool,
        row_limit: usize,
    ) -> Result<Value, ToolError> {
        self.gate.validate(sql, write)?;

        if write {
            let affected = self.source.execute_write(sql, params).await?;
            info!(affected, "Tool write executed");
            return Ok(json!({ "rowcount": affected }));
        }

        let limited = SqlSafetyGate::apply_row_limit(sql, row_limit);
        let mut result = self.source.query(&limited, params).await?;
        result.rows.truncate(row_limit);
        Ok(json!({ "rows": result.rows }))
    }

    /// The first `limit` rows of a table that exists in the catalog.
    pub async fn sample_rows(&self, table: &str, limit: usize) -> Result<Value, ToolError> {
        let catalog = self.source.list_tables().await?;
        if !catalog.iter().any(|t| t == table) {
            return Err(DataSourceError::UnknownTable(table.to_string()).into());
        }
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
        self.run_sql(&sql, &QueryParams::new(), false, limit).await
    }
}

#[async_trait]
impl ToolExecutor for SqlTools {
    fn specs(&self) -> Vec<ToolSpec> {
        tool_specs()
    }

    async fn execute(&self, name: &str, input: &Value) -> Result<Value, ToolError> {
        match name {
            "get_schema" => {
                let input: GetSchemaInput = parse_input(name, input)?;
                self.get_schema(input.include_counts, input.tables.as_deref())
                    .await
            }
            "run_sql" => {
                let input: RunSqlInput = parse_input(name, input)?;
                self.run_sql(&input.sql, &input.params, input.write, input.row_limit)
                    .await
            }
            "sample_rows" => {
                let input: SampleRowsInput = parse_input(name, input)?;
                self.sample_rows(&input.table, input.limit).await
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Runs every tool invocation in `message` and returns the user message that
/// carries the results.
pub async fn execute_tool_uses(executor: &dyn ToolExecutor, message: &ChatMessage) -> ChatMessage {
    let mut content = Vec::new();
    for call in message.tool_uses() {
        debug!(tool = %call.name, id = %call.id, "--> Executing tool");
        let outcome = match executor.execute(call.name, call.input).await {
            Ok(value) => ToolOutcome::Ok(value),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                ToolOutcome::Error(e.to_string())
            }
        };
        content.push(ContentBlock::ToolResult {
            tool_use_id: call.id.to_string(),
            content: outcome,
        });
    }
    ChatMessage {
        role: Role::User,
        content,
    }
}

/// The outcome of one or more agent steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    /// Every message of the conversation, including the ones passed in.
    pub messages: Vec<ChatMessage>,
    /// Tool results from the last cycle that ran tools.
    pub tool_results: Vec<ContentBlock>,
    pub iterations: usize,
}

impl AgentRun {
    /// The last assistant message.
    pub fn final_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    pub fn reply(&self) -> String {
        self.final_message().map(ChatMessage::text).unwrap_or_default()
    }
}

/// Sends `request`. If the reply invokes tools, runs them and sends one
/// follow-up so the model can answer with the results.
pub async fn agent_step(
    provider: &dyn AiProvider,
    executor: &dyn ToolExecutor,
    request: &ChatRequest,
) -> Result<AgentRun, AiError> {
    let mut messages = request.messages.clone();
    let reply = provider.chat(request).await?;
    messages.push(reply.clone());

    if !reply.has_tool_uses() {
        return Ok(AgentRun {
            messages,
            tool_results: Vec::new(),
            iterations: 1,
        });
    }

    let results = execute_tool_uses(executor, &reply).await;
    let tool_results = results.content.clone();
    messages.push(results);

    let follow_up = ChatRequest {
        messages: messages.clone(),
        ..request.clone()
    };
    let reply = provider.chat(&follow_up).await?;
    messages.push(reply);

    Ok(AgentRun {
        messages,
        tool_results,
        iterations: 1,
    })
}

/// Repeats tool-using cycles until a reply invokes no tool or `max_iters`
/// steps have run.
pub async fn agent_multistep(
    provider: &dyn AiProvider,
    executor: &dyn ToolExecutor,
    request: &ChatRequest,
    max_iters: usize,
) -> Result<AgentRun, AiError> {
    let mut run = agent_step(provider, executor, request).await?;

    while run.iterations < max_iters {
        let pending = match run.final_message() {
            Some(message) if message.has_tool_uses() => message.clone(),
            _ => break,
        };

        let results = execute_tool_uses(executor, &pending).await;
        let mut messages = run.messages;
        let mut tool_results = results.content.clone();
        messages.push(results);

        let next = ChatRequest {
            messages,
            ..request.clone()
        };
        let step = agent_step(provider, executor, &next).await?;
        if !step.tool_results.is_empty() {
            tool_results = step.tool_results;
        }
        run = AgentRun {
            messages: step.messages,
            tool_results,
            iterations: run.iterations + 1,
        };
    }

    info!(iterations = run.iterations, "Agent finished");
    Ok(run)
}
