//! # Schema Enrichment Pipeline
//!
//! Builds the three schema artifacts for the current fingerprint of a data source:
//!
//! 1. **Extracting**: catalog listing and sample rows.
//! 2. **Analyzing**: the model turns the raw schema into a structured JSON mapping.
//! 3. **Documenting**: the model writes a data dictionary from the structured mapping.
//!
//! Each stage persists its artifact as soon as it completes, and each stage checks
//! for its own artifact before running. A run that failed in stage 3 therefore
//! resumes at stage 3 on the next call. Calls for the same fingerprint are
//! serialized so concurrent first requests do the work once.

use crate::{
    config::GenerationConfig,
    errors::SchemaError,
    parsing::strip_code_fence,
    prompts::schema::{
        data_dictionary_user_prompt, schema_analysis_user_prompt, DATA_DICTIONARY_SYSTEM_PROMPT,
        SCHEMA_ANALYSIS_SYSTEM_PROMPT,
    },
    providers::{
        ai::{AiProvider, ChatMessage, ChatRequest},
        db::DataSource,
    },
    schema::{
        cache::{fingerprint, ArtifactKind, CacheInfo, Fingerprint, SchemaArtifact, SchemaCache},
        extractor::SchemaExtractor,
    },
    types::{SampleData, SchemaInfo},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where the pipeline is for the fingerprint it last worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Uninitialized,
    Extracting,
    Analyzing,
    Documenting,
    Cached,
}

impl PipelineStage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineStage::Extracting,
            2 => PipelineStage::Analyzing,
            3 => PipelineStage::Documenting,
            4 => PipelineStage::Cached,
            _ => PipelineStage::Uninitialized,
        }
    }
}

#[derive(Debug)]
pub struct SchemaPipeline {
    source: Arc<dyn DataSource>,
    ai_provider: Arc<dyn AiProvider>,
    cache: SchemaCache,
    extractor: SchemaExtractor,
    generation: GenerationConfig,
    stage: AtomicU8,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaPipeline {
    pub fn new(
        source: Arc<dyn DataSource>,
        ai_provider: Arc<dyn AiProvider>,
        cache: SchemaCache,
        extractor: SchemaExtractor,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            source,
            ai_provider,
            cache,
            extractor,
            generation,
            stage: AtomicU8::new(PipelineStage::Uninitialized as u8),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        PipelineStage::from_u8(self.stage.load(Ordering::SeqCst))
    }

    fn set_stage(&self, stage: PipelineStage) {
        debug!(?stage, "Schema pipeline stage");
        self.stage.store(stage as u8, Ordering::SeqCst);
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub async fn fingerprint(&self) -> Result<Fingerprint, SchemaError> {
        Ok(fingerprint(&self.source.identity()).await?)
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops this caller's handle and removes the map entry once no other
    /// caller holds or waits on it.
    async fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Number of fingerprints with a pipeline run in progress or queued.
    pub async fn in_flight(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Returns the schema artifacts for the data source's current content.
    ///
    /// With `force_refresh` the cached artifacts are deleted and all three
    /// stages run again.
    pub async fn get_schema_info(&self, force_refresh: bool) -> Result<SchemaInfo, SchemaError> {
        let key = self.fingerprint().await?.key();
        let lock = self.lock_for(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.load_or_run(&key, force_refresh).await
        };
        self.release_lock(&key, lock).await;
        result
    }

    async fn load_or_run(&self, key: &str, force_refresh: bool) -> Result<SchemaInfo, SchemaError> {
        if force_refresh {
            info!(key = %key, "Forcing schema refresh");
            self.cache.clear(key).await?;
        } else if let Some(info) = self.load_complete(key).await {
            info!(key = %key, "Loaded schema artifacts from cache");
            self.set_stage(PipelineStage::Cached);
            return Ok(info);
        }

        match self.run(key).await {
            Ok(info) => {
                self.set_stage(PipelineStage::Cached);
                Ok(info)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Schema pipeline failed");
                self.set_stage(PipelineStage::Uninitialized);
                Err(e)
            }
        }
    }

    /// Clears the cache for the current fingerprint and regenerates everything.
    pub async fn refresh(&self) -> Result<SchemaInfo, SchemaError> {
        self.get_schema_info(true).await
    }

    pub async fn cache_info(&self) -> Result<CacheInfo, SchemaError> {
        let fingerprint = self.fingerprint().await?;
        Ok(self.cache.info(&fingerprint).await)
    }

    async fn load_complete(&self, key: &str) -> Option<SchemaInfo> {
        if !self.cache.has(key).await {
            return None;
        }
        let raw = self.cache.load(ArtifactKind::RawSchema, key).await.ok()??;
        let structured = self
            .cache
            .load(ArtifactKind::StructuredSchema, key)
            .await
            .ok()??;
        let dictionary = self
            .cache
            .load(ArtifactKind::DataDictionary, key)
            .await
            .ok()??;

        match (raw, structured, dictionary) {
            (
                SchemaArtifact::RawSchema {
                    raw_schema,
                    sample_data,
                },
                SchemaArtifact::StructuredSchema(structured_schema),
                SchemaArtifact::DataDictionary(data_dictionary),
            ) => Some(SchemaInfo {
                raw_schema,
                sample_data,
                structured_schema,
                data_dictionary,
            }),
            _ => None,
        }
    }

    async fn run(&self, key: &str) -> Result<SchemaInfo, SchemaError> {
        self.set_stage(PipelineStage::Extracting);
        let (raw_schema, sample_data) = match self.cache.load(ArtifactKind::RawSchema, key).await {
            Ok(Some(SchemaArtifact::RawSchema {
                raw_schema,
                sample_data,
            })) => {
                debug!(key = %key, "Reusing cached raw schema");
                (raw_schema, sample_data)
            }
            _ => {
                let (raw_schema, sample_data) = self.extractor.extract(self.source.as_ref()).await?;
                self.cache
                    .save(
                        key,
                        &SchemaArtifact::RawSchema {
                            raw_schema: raw_schema.clone(),
                            sample_data: sample_data.clone(),
                        },
                    )
                    .await?;
                (raw_schema, sample_data)
            }
        };

        self.set_stage(PipelineStage::Analyzing);
        let structured_schema =
            match self.cache.load(ArtifactKind::StructuredSchema, key).await {
                Ok(Some(SchemaArtifact::StructuredSchema(value))) => value,
                _ => {
                    let value = self.analyze(&raw_schema, &sample_data).await?;
                    self.cache
                        .save(key, &SchemaArtifact::StructuredSchema(value.clone()))
                        .await?;
                    value
                }
            };

        self.set_stage(PipelineStage::Documenting);
        let data_dictionary = match self.cache.load(ArtifactKind::DataDictionary, key).await {
            Ok(Some(SchemaArtifact::DataDictionary(text))) => text,
            _ => {
                let text = self.document(&structured_schema, &sample_data).await?;
                self.cache
                    .save(key, &SchemaArtifact::DataDictionary(text.clone()))
                    .await?;
                text
            }
        };

        info!(key = %key, "Schema artifacts generated and cached");
        Ok(SchemaInfo {
            raw_schema,
            sample_data,
            structured_schema,
            data_dictionary,
        })
    }

    async fn analyze(
        &self,
        raw_schema: &str,
        sample_data: &SampleData,
    ) -> Result<Value, SchemaError> {
        let user_prompt = schema_analysis_user_prompt(raw_schema, sample_data);
        debug!(user_prompt = %user_prompt, "--> Sending schema for analysis");

        let request = ChatRequest::new(
            SCHEMA_ANALYSIS_SYSTEM_PROMPT,
            vec![ChatMessage::user_text(user_prompt)],
        )
        .with_params(self.generation.analysis);
        let response = self
            .ai_provider
            .chat(&request)
            .await
            .map_err(SchemaError::Analysis)?
            .text();

        debug!("<-- Structured schema from AI: {}", response);
        parse_structured_schema(&response)
    }

    async fn document(
        &self,
        structured_schema: &Value,
        sample_data: &SampleData,
    ) -> Result<String, SchemaError> {
        let user_prompt = data_dictionary_user_prompt(structured_schema, sample_data);
        debug!("--> Requesting data dictionary");

        let request = ChatRequest::new(
            DATA_DICTIONARY_SYSTEM_PROMPT,
            vec![ChatMessage::user_text(user_prompt)],
        )
        .with_params(self.generation.dictionary);
        let text = self
            .ai_provider
            .chat(&request)
            .await
            .map_err(SchemaError::Documentation)?
            .text();

        debug!("<-- Data dictionary received ({} chars)", text.len());
        if text.is_empty() {
            return Err(SchemaError::Parse("data dictionary is empty".to_string()));
        }
        Ok(text)
    }
}

/// Parses the analysis reply into a JSON object.
pub fn parse_structured_schema(response: &str) -> Result<Value, SchemaError> {
    let body = strip_code_fence(response, "json").map_err(|e| SchemaError::Parse(e.to_string()))?;
    let value: Value =
        serde_json::from_str(&body).map_err(|e| SchemaError::Parse(e.to_string()))?;
    if !value.is_object() {
        return Err(SchemaError::Parse(
            "structured schema must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}
