//! # Schema Pipeline Tests
//!
//! The enrichment pipeline runs extraction, analysis and documentation once per
//! fingerprint, serves later calls from the cache and resumes a failed run at the
//! stage that failed.

mod common;

use crate::common::{
    schema_ready_provider, setup_tracing, ANALYSIS_KEY, DATA_DICTIONARY, DICTIONARY_KEY,
    STRUCTURED_SCHEMA,
};
use nlsql::config::GenerationConfig;
use nlsql::errors::SchemaError;
use nlsql::schema::{ArtifactKind, PipelineStage, SchemaCache, SchemaExtractor, SchemaPipeline};
use nlsql_test_utils::{MockAiProvider, TestSetup};
use std::path::Path;
use std::sync::Arc;

async fn pipeline(dir: &Path, provider: &MockAiProvider) -> anyhow::Result<SchemaPipeline> {
    let setup = TestSetup::new().await?;
    Ok(SchemaPipeline::new(
        Arc::new(setup.source),
        Arc::new(provider.clone()),
        SchemaCache::new(dir),
        SchemaExtractor::new(5),
        GenerationConfig::default(),
    ))
}

#[tokio::test]
async fn test_cold_start_runs_every_stage_once() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    let pipeline = pipeline(dir.path(), &provider).await?;
    assert_eq!(pipeline.stage(), PipelineStage::Uninitialized);

    let info = pipeline.get_schema_info(false).await?;
    assert!(info.raw_schema.starts_with("Database Schema:"));
    assert!(info.raw_schema.contains("Table: customers"));
    assert_eq!(info.sample_data["customers"].len(), 3);
    assert!(info.structured_schema["tables"]["customers"].is_object());
    assert_eq!(info.data_dictionary, DATA_DICTIONARY);
    assert_eq!(pipeline.stage(), PipelineStage::Cached);

    let calls = provider.get_calls();
    assert_eq!(calls.len(), 2);
    // The analysis prompt carries the raw schema and the dictionary prompt the
    // structured mapping.
    assert!(calls[0].1.contains("Table: orders"));
    assert!(calls[1].1.contains("People who place orders"));
    Ok(())
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    let pipeline = pipeline(dir.path(), &provider).await?;

    let first = pipeline.get_schema_info(false).await?;
    let second = pipeline.get_schema_info(false).await?;

    assert_eq!(first, second);
    assert_eq!(provider.count_calls(ANALYSIS_KEY), 1);
    assert_eq!(provider.count_calls(DICTIONARY_KEY), 1);

    let info = pipeline.cache_info().await?;
    assert!(info.has_complete_cache);
    assert!(info.key.starts_with("memory_"));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_first_requests_generate_once() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    let pipeline = Arc::new(pipeline(dir.path(), &provider).await?);

    let a = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.get_schema_info(false).await }
    });
    let b = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.get_schema_info(false).await }
    });
    let (a, b) = (a.await??, b.await??);

    assert_eq!(a, b);
    assert_eq!(provider.count_calls(ANALYSIS_KEY), 1);
    assert_eq!(provider.count_calls(DICTIONARY_KEY), 1);
    // The per-fingerprint lock is dropped once both callers are done.
    assert_eq!(pipeline.in_flight().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_documentation_resumes_without_reanalysis() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = MockAiProvider::new();
    provider.add_response(ANALYSIS_KEY, STRUCTURED_SCHEMA);
    provider.add_failure(DICTIONARY_KEY, "quota exceeded");
    provider.add_response(DICTIONARY_KEY, DATA_DICTIONARY);
    let pipeline = pipeline(dir.path(), &provider).await?;

    let err = pipeline.get_schema_info(false).await.unwrap_err();
    assert!(matches!(err, SchemaError::Documentation(_)));
    assert_eq!(pipeline.stage(), PipelineStage::Uninitialized);

    let key = pipeline.fingerprint().await?.key();
    let cache = pipeline.cache();
    assert!(cache.load(ArtifactKind::RawSchema, &key).await?.is_some());
    assert!(cache.load(ArtifactKind::StructuredSchema, &key).await?.is_some());
    assert!(!cache.has(&key).await);

    let info = pipeline.get_schema_info(false).await?;
    assert_eq!(info.data_dictionary, DATA_DICTIONARY);
    assert_eq!(provider.count_calls(ANALYSIS_KEY), 1);
    assert_eq!(provider.count_calls(DICTIONARY_KEY), 2);
    Ok(())
}

#[tokio::test]
async fn test_unparseable_analysis_is_a_pipeline_error() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = MockAiProvider::new();
    provider.add_response(ANALYSIS_KEY, "I could not analyze this schema.");
    let pipeline = pipeline(dir.path(), &provider).await?;

    let err = pipeline.get_schema_info(false).await.unwrap_err();
    assert!(matches!(err, SchemaError::Parse(_)));
    assert!(!pipeline.cache_info().await?.has_complete_cache);
    assert_eq!(pipeline.in_flight().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_force_refresh_regenerates_everything() -> anyhow::Result<()> {
    setup_tracing();
    let dir = tempfile::tempdir()?;
    let provider = schema_ready_provider();
    let pipeline = pipeline(dir.path(), &provider).await?;

    pipeline.get_schema_info(false).await?;
    pipeline.refresh().await?;

    assert_eq!(provider.count_calls(ANALYSIS_KEY), 2);
    assert_eq!(provider.count_calls(DICTIONARY_KEY), 2);
    assert_eq!(pipeline.stage(), PipelineStage::Cached);
    Ok(())
}
