//! # Application Configuration
//!
//! This module defines the configuration structure for the `nlsql-server` and
//! provides the logic for loading it from a `config.yml` file and environment
//! variables.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use nlsql::config::{EmbeddingConfig, EngineConfig, ProviderConfig};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use tracing::info;

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

impl From<regex::Error> for ConfigError {
    fn from(err: regex::Error) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    pub port: u16,
    /// The path to the SQLite database to query. Loaded from `DB_URL` env var.
    pub db_url: String,
    /// The key in `providers` used for every generation call.
    pub active_provider: String,
    /// A map of named, reusable AI provider configurations.
    pub providers: HashMap<String, ProviderConfig>,
    /// Configuration for the text embedding model.
    pub embedding: EmbeddingConfig,
    /// Cache locations, limits, write policy and generation settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// The provider entry named by `active_provider`.
    pub fn active_provider_config(&self) -> Result<&ProviderConfig, ConfigError> {
        self.providers.get(&self.active_provider).ok_or_else(|| {
            ConfigError::General(format!(
                "active_provider '{}' is not defined under 'providers'",
                self.active_provider
            ))
        })
    }
}

// Reads a file and substitutes `${VAR}` references from the environment.
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")?;
    let expanded_content = re.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });

    Ok(Some(expanded_content.to_string()))
}

/// Loads the application configuration from a file and environment variables.
///
/// Layers, lowest precedence first:
/// - built-in defaults (`port`, `db_url`, `active_provider`),
/// - the YAML file, with `${VAR}` references substituted,
/// - top-level keys from plain environment variables (`PORT`, `DB_URL`),
/// - nested keys from `NLSQL_` variables (e.g. `NLSQL_ENGINE__ROW_LIMIT`).
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");
    let mut builder = ConfigBuilder::builder()
        .set_default("port", 9090)?
        .set_default("db_url", "db/nlsql.db")?
        .set_default("active_provider", "default")?;

    let main_config_path = if let Some(override_path) = config_path_override {
        override_path.to_string()
    } else {
        let user_config_path = format!("{base_path}/config.yml");
        if std::path::Path::new(&user_config_path).exists() {
            info!("Loading user-defined configuration from '{user_config_path}'.");
            user_config_path
        } else {
            let provider = env::var("AI_PROVIDER").unwrap_or_else(|_| "local".to_string());
            let fallback_path = format!("{base_path}/config.{provider}.yml");
            info!("'{user_config_path}' not found. Falling back to '{fallback_path}' based on AI_PROVIDER='{provider}'.");
            fallback_path
        }
    };

    let main_content = read_and_substitute(&main_config_path)?.ok_or_else(|| {
        ConfigError::NotFound(format!(
            "Main config file not found at '{main_config_path}'. Please create 'config.yml' or set AI_PROVIDER to 'local' or 'gemini'."
        ))
    })?;
    builder = builder.add_source(File::from_str(&main_content, FileFormat::Yaml));

    let settings = builder
        .add_source(Environment::default())
        .add_source(
            Environment::with_prefix("NLSQL")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.active_provider_config()?;
    Ok(config)
}
