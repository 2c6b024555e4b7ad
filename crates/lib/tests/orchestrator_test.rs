//! # Query Orchestrator Tests
//!
//! End-to-end request handling against the seeded in-memory database with a
//! scripted model: cold start, safety rejection, degraded retrieval and the
//! explanation paths.

mod common;

use crate::common::{
    engine_config, orchestrator, orchestrator_with_config, schema_ready_provider, setup_tracing,
    ANALYSIS_KEY, DICTIONARY_KEY, EXAMPLES_KEY, EXPLANATION_KEY, SQL_KEY,
};
use nlsql::config::EngineConfig;
use nlsql::schema::PipelineStage;
use nlsql::types::{ConversationTurn, Example};
use nlsql_test_utils::{MockAiProvider, MockEmbedder};
use serde_json::json;
use std::{sync::Arc, time::Duration};

#[tokio::test]
async fn test_cold_start_answers_a_count_question() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(
        SQL_KEY,
        "```sql\nSELECT COUNT(*) AS count FROM customers;\n```",
    );
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;
    assert_eq!(engine.schema_stage(), PipelineStage::Uninitialized);

    let result = engine
        .process("How many customers are there?", false, &[])
        .await;

    assert!(result.success, "unexpected error: {:?}", result.error);
    assert_eq!(result.query, "How many customers are there?");
    assert_eq!(
        result.sql.as_deref(),
        Some("SELECT COUNT(*) AS count FROM customers")
    );
    assert_eq!(result.columns, Some(vec!["count".to_string()]));
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.results.as_ref().map(|r| r[0]["count"].clone()), Some(json!(3)));
    assert!(result.explanation.is_none());
    assert!(result.error.is_none());

    assert_eq!(provider.count_calls(ANALYSIS_KEY), 1);
    assert_eq!(provider.count_calls(DICTIONARY_KEY), 1);
    assert_eq!(engine.schema_stage(), PipelineStage::Cached);

    // The generation prompt is grounded in the schema and the dictionary.
    let calls = provider.get_calls();
    let (_, sql_prompt) = calls
        .iter()
        .find(|(system, _)| system.contains(SQL_KEY))
        .cloned()
        .unwrap_or_default();
    assert!(sql_prompt.contains("Table: customers"));
    assert!(sql_prompt.contains("customers.id: unique customer identifier."));
    assert!(sql_prompt.ends_with("User Question: How many customers are there?\n\nSQL Query:"));

    // The schema is memoized: a second request does no enrichment work.
    engine.process("How many customers are there?", false, &[]).await;
    assert_eq!(provider.count_calls(ANALYSIS_KEY), 1);
    Ok(())
}

#[tokio::test]
async fn test_direct_drop_is_rejected_before_execution() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = MockAiProvider::new();
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let execution = engine.execute_direct_sql("DROP TABLE customers").await;

    assert!(!execution.success);
    assert_eq!(
        execution.error.as_deref(),
        Some("Banned token detected: DROP")
    );
    assert!(engine.list_tables().await?.contains(&"customers".to_string()));
    assert!(provider.get_calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_direct_select_is_row_limited() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = MockAiProvider::new();
    let embedder = MockEmbedder::default();
    let config = EngineConfig {
        row_limit: 2,
        ..engine_config(dir.path())
    };
    let engine = orchestrator_with_config(config, &provider, &embedder).await?;

    let execution = engine
        .execute_direct_sql("SELECT id FROM orders ORDER BY id")
        .await;
    assert!(execution.success);
    assert_eq!(execution.sql, "SELECT id FROM orders ORDER BY id");
    assert_eq!(execution.results.map(|r| r.len()), Some(2));

    // A CTE gets no LIMIT clause but is still capped.
    let execution = engine
        .execute_direct_sql("WITH x AS (SELECT id FROM orders) SELECT id FROM x")
        .await;
    assert!(execution.success);
    assert_eq!(execution.results.map(|r| r.len()), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_refresh_keeps_previous_schema_readable() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;
    let first = engine.initialize_schema(false).await?;

    provider.set_delay(ANALYSIS_KEY, Duration::from_millis(500));
    let refresh = engine.initialize_schema(true);
    let read = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_millis(200), engine.schema_info()).await
    };
    let (refreshed, read) = tokio::join!(refresh, read);

    let during = read.expect("memo readable while refreshing")?;
    assert!(Arc::ptr_eq(&during, &first));
    let refreshed = refreshed?;
    assert!(!Arc::ptr_eq(&refreshed, &first));
    assert!(Arc::ptr_eq(&engine.schema_info().await?, &refreshed));
    assert_eq!(provider.count_calls(ANALYSIS_KEY), 2);
    Ok(())
}

#[tokio::test]
async fn test_generated_write_is_refused() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(SQL_KEY, "DELETE FROM customers");
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let result = engine.process("Remove every customer", false, &[]).await;

    assert!(!result.success);
    assert_eq!(result.sql.as_deref(), Some("DELETE FROM customers"));
    assert_eq!(
        result.error.as_deref(),
        Some("Write operation attempted without approval.")
    );
    assert_eq!(engine.list_tables().await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_failed_retrieval_degrades_to_no_examples() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(SQL_KEY, "SELECT name FROM products ORDER BY price DESC LIMIT 1");
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;
    engine
        .example_store()
        .add_all(vec![Example::new(
            "Most expensive product",
            "SELECT name FROM products ORDER BY price DESC LIMIT 1",
        )])
        .await?;

    embedder.set_failing(true);
    let result = engine.process("What costs the most?", false, &[]).await;

    assert!(result.success, "unexpected error: {:?}", result.error);
    assert_eq!(
        result.results.as_ref().map(|r| r[0]["name"].clone()),
        Some(json!("Keyboard"))
    );
    let calls = provider.get_calls();
    let sql_prompt = calls
        .iter()
        .find(|(system, _)| system.contains(SQL_KEY))
        .map(|(_, user)| user.clone())
        .unwrap_or_default();
    assert!(!sql_prompt.contains("# Similar Examples"));
    Ok(())
}

#[tokio::test]
async fn test_retrieved_examples_reach_the_prompt() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(SQL_KEY, "SELECT COUNT(*) AS count FROM orders");
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;
    engine
        .example_store()
        .add_all(vec![
            Example::new("How many orders are there?", "SELECT COUNT(*) FROM orders"),
            Example::new("List products", "SELECT * FROM products"),
        ])
        .await?;

    let result = engine.process("How many orders?", false, &[]).await;
    assert!(result.success);

    let (_, sql_prompt) = provider
        .get_calls()
        .into_iter()
        .find(|(system, _)| system.contains(SQL_KEY))
        .unwrap_or_default();
    assert!(sql_prompt.contains(
        "Example 1:\nQuestion: How many orders are there?\nSQL: SELECT COUNT(*) FROM orders"
    ));
    Ok(())
}

#[tokio::test]
async fn test_failed_sql_still_gets_an_explanation() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(SQL_KEY, "SELECT loyalty_tier FROM customers");
    provider.add_response(
        EXPLANATION_KEY,
        "The customers table has no loyalty_tier column.",
    );
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let result = engine
        .process("What loyalty tier is each customer?", true, &[])
        .await;

    assert!(!result.success);
    assert_eq!(result.sql.as_deref(), Some("SELECT loyalty_tier FROM customers"));
    assert!(result.results.is_none());
    let error = result.error.clone().unwrap_or_default();
    assert!(error.starts_with("Database error:"), "{error}");
    assert_eq!(
        result.explanation.as_deref(),
        Some("The customers table has no loyalty_tier column.")
    );

    let (_, explanation_prompt) = provider
        .get_calls()
        .into_iter()
        .find(|(system, _)| system.contains(EXPLANATION_KEY))
        .unwrap_or_default();
    assert!(explanation_prompt.contains("But it resulted in an error"));
    Ok(())
}

#[tokio::test]
async fn test_explanation_failure_is_swallowed() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(SQL_KEY, "SELECT COUNT(*) AS count FROM products");
    provider.add_failure(EXPLANATION_KEY, "model overloaded");
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let result = engine.process("How many products?", true, &[]).await;

    assert!(result.success);
    assert!(result.explanation.is_none());
    assert!(result.error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_schema_failure_is_reported_without_sql() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = MockAiProvider::new();
    provider.add_failure(ANALYSIS_KEY, "invalid api key");
    provider.add_response(EXPLANATION_KEY, "unused");
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let result = engine.process("How many customers?", true, &[]).await;

    assert!(!result.success);
    assert!(result.sql.is_none());
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Schema analysis failed")));
    // No SQL was generated, so there is nothing to explain.
    assert!(result.explanation.is_none());
    assert_eq!(provider.count_calls(EXPLANATION_KEY), 0);
    Ok(())
}

#[tokio::test]
async fn test_history_is_sent_before_the_question() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(SQL_KEY, "SELECT name FROM customers WHERE city = 'Bangkok'");
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let history = vec![
        ConversationTurn::user("How many customers are there?"),
        ConversationTurn::assistant("SELECT COUNT(*) FROM customers"),
    ];
    let result = engine.process("Which of them live in Bangkok?", false, &history).await;
    assert!(result.success);
    assert_eq!(result.row_count(), 2);

    let request = provider
        .get_requests()
        .into_iter()
        .find(|r| r.system.contains(SQL_KEY))
        .ok_or_else(|| anyhow::anyhow!("no SQL generation request"))?;
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[0].text(), "How many customers are there?");
    assert_eq!(request.messages[1].text(), "SELECT COUNT(*) FROM customers");
    assert!(request.messages[2].text().contains("Which of them live in Bangkok?"));
    Ok(())
}

#[tokio::test]
async fn test_generate_examples_falls_back_to_templates() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(EXAMPLES_KEY, "Sorry, I cannot help with that.");
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let generation = engine.generate_examples(10).await?;

    assert!(generation.used_fallback);
    assert_eq!(generation.num_examples, 6);
    assert_eq!(generation.examples[0].natural_language_query, "Show all customers");
    assert_eq!(engine.rag_stats().await.total_examples, 6);
    assert_eq!(engine.rag_examples().await.len(), 6);

    engine.clear_examples().await?;
    assert!(!engine.rag_stats().await.data_loaded);
    Ok(())
}

#[tokio::test]
async fn test_generate_examples_from_the_model() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    provider.add_response(
        EXAMPLES_KEY,
        r#"```json
[
  {"natural_language_query": "How many orders were placed?", "sql_query": "SELECT COUNT(*) FROM orders;"},
  {"natural_language_query": "Who lives in Bangkok?", "sql_query": "SELECT name FROM customers WHERE city = 'Bangkok'"},
  {"natural_language_query": "Average product price?", "sql_query": "SELECT AVG(price) FROM products"}
]
```"#,
    );
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let generation = engine.generate_examples(2).await?;

    assert!(!generation.used_fallback);
    assert_eq!(generation.num_examples, 2);
    assert_eq!(generation.examples[0].sql_query, "SELECT COUNT(*) FROM orders");

    let (_, prompt) = provider
        .get_calls()
        .into_iter()
        .find(|(system, _)| system.contains(EXAMPLES_KEY))
        .unwrap_or_default();
    assert!(prompt.contains("Generate 2 diverse"));
    Ok(())
}

#[tokio::test]
async fn test_database_info_and_refresh() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    let embedder = MockEmbedder::default();
    let engine = orchestrator(dir.path(), &provider, &embedder).await?;

    let info = engine.database_info().await?;
    assert_eq!(info.tables, vec!["customers", "orders", "products"]);
    assert_eq!(info.sample_data.len(), 3);
    assert!(info.structured_schema["tables"].is_object());

    let cache = engine.cache_info().await?;
    assert!(cache.has_complete_cache);

    engine.refresh_schema().await?;
    assert_eq!(provider.count_calls(ANALYSIS_KEY), 2);
    Ok(())
}
