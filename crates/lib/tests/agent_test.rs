//! # Tool-Calling Agent Tests
//!
//! The SQL tools against the seeded database, and the step loop that executes
//! model tool invocations and feeds results back.

mod common;

use crate::common::{setup_tracing, AGENT_KEY};
use nlsql::agent::{agent_multistep, agent_step, execute_tool_uses, SqlTools, ToolExecutor};
use nlsql::errors::{DataSourceError, SafetyError, ToolError};
use nlsql::prompts::agent::agent_system_prompt;
use nlsql::providers::ai::{ChatMessage, ChatRequest, ContentBlock, ToolOutcome};
use nlsql::types::Role;
use nlsql::SqlSafetyGate;
use nlsql_test_utils::{MockAiProvider, TestSetup};
use serde_json::json;
use std::sync::Arc;

async fn tools(allow_writes: bool) -> anyhow::Result<SqlTools> {
    let setup = TestSetup::new().await?;
    Ok(SqlTools::new(
        Arc::new(setup.source),
        SqlSafetyGate::new(allow_writes),
    ))
}

fn agent_request(tools: &SqlTools, question: &str) -> ChatRequest {
    ChatRequest::new(
        agent_system_prompt("SQLite"),
        vec![ChatMessage::user_text(question)],
    )
    .with_tools(tools.specs())
}

fn outcomes(message: &ChatMessage) -> Vec<(String, ToolOutcome)> {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => Some((tool_use_id.clone(), content.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_get_schema_with_and_without_counts() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;

    let schema = tools.execute("get_schema", &json!({})).await?;
    assert_eq!(schema["customers"][0], json!({"column": "id", "type": "INTEGER"}));
    assert!(schema["orders"].is_array());

    let schema = tools
        .execute("get_schema", &json!({"include_counts": true, "tables": ["orders"]}))
        .await?;
    let tables: Vec<&String> = schema.as_object().map(|o| o.keys().collect()).unwrap_or_default();
    assert_eq!(tables, vec!["orders"]);
    assert_eq!(schema["orders"]["row_count"], json!(3));
    assert_eq!(schema["orders"]["columns"].as_array().map(Vec::len), Some(5));
    Ok(())
}

#[tokio::test]
async fn test_run_sql_reads_with_params_and_row_limit() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;

    let result = tools
        .execute(
            "run_sql",
            &json!({
                "sql": "SELECT name FROM customers WHERE city = :city ORDER BY name",
                "params": {"city": "Bangkok"}
            }),
        )
        .await?;
    assert_eq!(result, json!({"rows": [{"name": "Alice"}, {"name": "Carol"}]}));

    let limited = tools
        .execute("run_sql", &json!({"sql": "SELECT * FROM orders", "row_limit": 1}))
        .await?;
    assert_eq!(limited["rows"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_run_sql_write_paths() -> anyhow::Result<()> {
    setup_tracing();
    let locked = tools(false).await?;
    let err = locked
        .execute("run_sql", &json!({"sql": "DELETE FROM orders"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Safety(SafetyError::WriteNotApproved)));

    let err = locked
        .execute("run_sql", &json!({"sql": "DELETE FROM orders", "write": true}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Safety(SafetyError::WritesDisabled)));

    let open = tools(true).await?;
    let result = open
        .execute(
            "run_sql",
            &json!({"sql": "DELETE FROM orders WHERE customer_id = :id", "params": {"id": 1}, "write": true}),
        )
        .await?;
    assert_eq!(result, json!({"rowcount": 2}));
    Ok(())
}

#[tokio::test]
async fn test_sample_rows_checks_the_catalog() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;

    let rows = tools
        .execute("sample_rows", &json!({"table": "products", "limit": 1}))
        .await?;
    assert_eq!(rows["rows"].as_array().map(Vec::len), Some(1));

    let err = tools
        .execute("sample_rows", &json!({"table": "customers; DROP TABLE orders"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ToolError::DataSource(DataSourceError::UnknownTable(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_unknown_tool_becomes_an_error_payload() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;
    let call = ChatMessage {
        role: Role::Assistant,
        content: vec![
            ContentBlock::ToolUse {
                id: "call-1".into(),
                name: "drop_everything".into(),
                input: json!({}),
            },
            ContentBlock::ToolUse {
                id: "call-2".into(),
                name: "run_sql".into(),
                input: json!({"sql": "SELECT COUNT(*) AS count FROM customers"}),
            },
        ],
    };

    let results = execute_tool_uses(&tools, &call).await;
    assert_eq!(results.role, Role::User);
    let outcomes = outcomes(&results);
    assert_eq!(
        outcomes[0],
        (
            "call-1".to_string(),
            ToolOutcome::Error("Unknown tool: drop_everything".into())
        )
    );
    assert_eq!(
        outcomes[1],
        (
            "call-2".to_string(),
            ToolOutcome::Ok(json!({"rows": [{"count": 3}]}))
        )
    );
    Ok(())
}

#[tokio::test]
async fn test_agent_step_sends_tool_results_back() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;
    let provider = MockAiProvider::new();
    provider.add_tool_call(
        AGENT_KEY,
        "call-1",
        "run_sql",
        json!({"sql": "SELECT COUNT(*) AS count FROM customers"}),
    );
    provider.add_response(AGENT_KEY, "There are 3 customers.");

    let run = agent_step(&provider, &tools, &agent_request(&tools, "How many customers?")).await?;

    assert_eq!(run.reply(), "There are 3 customers.");
    assert_eq!(run.messages.len(), 4);
    assert_eq!(run.tool_results.len(), 1);

    let requests = provider.get_requests();
    assert_eq!(requests.len(), 2);
    let follow_up = &requests[1].messages;
    assert_eq!(
        outcomes(&follow_up[2]),
        vec![(
            "call-1".to_string(),
            ToolOutcome::Ok(json!({"rows": [{"count": 3}]}))
        )]
    );
    assert!(!requests[1].tools.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_agent_step_without_tools_is_one_call() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;
    let provider = MockAiProvider::new();
    provider.add_response(AGENT_KEY, "Hello.");

    let run = agent_step(&provider, &tools, &agent_request(&tools, "Hi")).await?;
    assert_eq!(run.reply(), "Hello.");
    assert!(run.tool_results.is_empty());
    assert_eq!(provider.get_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_multistep_follows_chained_tool_calls() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;
    let provider = MockAiProvider::new();
    provider.add_tool_call(AGENT_KEY, "c1", "get_schema", json!({}));
    provider.add_tool_call(AGENT_KEY, "c2", "sample_rows", json!({"table": "products"}));
    provider.add_tool_call(
        AGENT_KEY,
        "c3",
        "run_sql",
        json!({"sql": "SELECT name FROM products ORDER BY price DESC LIMIT 1"}),
    );
    provider.add_response(AGENT_KEY, "The Keyboard is the most expensive product.");

    let run = agent_multistep(
        &provider,
        &tools,
        &agent_request(&tools, "Most expensive product?"),
        3,
    )
    .await?;

    assert_eq!(run.reply(), "The Keyboard is the most expensive product.");
    assert_eq!(run.iterations, 2);
    assert_eq!(provider.get_calls().len(), 4);
    assert_eq!(
        outcomes(&ChatMessage {
            role: Role::User,
            content: run.tool_results.clone()
        }),
        vec![(
            "c3".to_string(),
            ToolOutcome::Ok(json!({"rows": [{"name": "Keyboard"}]}))
        )]
    );
    Ok(())
}

#[tokio::test]
async fn test_multistep_stops_at_the_iteration_bound() -> anyhow::Result<()> {
    setup_tracing();
    let tools = tools(false).await?;
    let provider = MockAiProvider::new();
    // The model never stops asking for the schema.
    provider.add_tool_call(AGENT_KEY, "loop", "get_schema", json!({}));

    let run = agent_multistep(&provider, &tools, &agent_request(&tools, "?"), 2).await?;

    assert_eq!(run.iterations, 2);
    assert!(run.final_message().is_some_and(ChatMessage::has_tool_uses));
    // Two calls per step.
    assert_eq!(provider.get_calls().len(), 4);
    Ok(())
}
