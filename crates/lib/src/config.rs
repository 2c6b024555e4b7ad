//! # Engine Configuration
//!
//! `EngineConfig` is constructed once by the caller and handed to each component
//! at construction time. Nothing in the library reads ambient process state, so
//! several engines (for different databases, or in tests) can coexist.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sampling parameters for one kind of generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Per-task sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_sql_params")]
    pub sql: GenerationParams,
    #[serde(default = "default_explanation_params")]
    pub explanation: GenerationParams,
    #[serde(default = "default_analysis_params")]
    pub analysis: GenerationParams,
    #[serde(default = "default_dictionary_params")]
    pub dictionary: GenerationParams,
    #[serde(default = "default_examples_params")]
    pub examples: GenerationParams,
    #[serde(default = "default_agent_params")]
    pub agent: GenerationParams,
}

fn default_sql_params() -> GenerationParams {
    GenerationParams {
        max_tokens: 1000,
        temperature: 0.1,
    }
}

fn default_explanation_params() -> GenerationParams {
    GenerationParams {
        max_tokens: 500,
        temperature: 0.7,
    }
}

fn default_analysis_params() -> GenerationParams {
    GenerationParams {
        max_tokens: 4000,
        temperature: 0.0,
    }
}

fn default_dictionary_params() -> GenerationParams {
    GenerationParams {
        max_tokens: 4000,
        temperature: 0.2,
    }
}

fn default_examples_params() -> GenerationParams {
    GenerationParams {
        max_tokens: 8000,
        temperature: 0.8,
    }
}

fn default_agent_params() -> GenerationParams {
    GenerationParams {
        max_tokens: 2000,
        temperature: 0.3,
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            sql: default_sql_params(),
            explanation: default_explanation_params(),
            analysis: default_analysis_params(),
            dictionary: default_dictionary_params(),
            examples: default_examples_params(),
            agent: default_agent_params(),
        }
    }
}

/// Bounded retry with exponential backoff for generation calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Hard timeout applied to every individual attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    32_000
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryConfig {
    /// The delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The kind of generation backend a provider entry talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Local,
}

/// A reusable configuration for a specific AI provider instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    /// The API URL. Optional for Gemini, where it is derived from the model name.
    #[serde(default)]
    pub api_url: Option<String>,
    /// The API key, which can be absent for local providers.
    #[serde(default)]
    pub api_key: Option<String>,
    pub model_name: String,
}

/// Configuration for the text embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub model_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub dimension: usize,
}

/// Configuration shared by every component of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding schema artifact cache files.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory holding the example list and its vector index.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Sample rows captured per table during extraction.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    /// Similar examples retrieved per request.
    #[serde(default = "default_similar_examples")]
    pub similar_examples: usize,
    /// Row cap appended to unbounded read statements.
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    /// Global write policy. When false every write is rejected, approved or not.
    #[serde(default)]
    pub allow_writes: bool,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(constants::DEFAULT_CACHE_DIR)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(constants::DEFAULT_DATA_DIR)
}

fn default_sample_rows() -> usize {
    constants::DEFAULT_SAMPLE_ROWS
}

fn default_similar_examples() -> usize {
    constants::DEFAULT_SIMILAR_EXAMPLES
}

fn default_row_limit() -> usize {
    constants::DEFAULT_ROW_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            data_dir: default_data_dir(),
            sample_rows: default_sample_rows(),
            similar_examples: default_similar_examples(),
            row_limit: default_row_limit(),
            allow_writes: false,
            generation: GenerationConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}
