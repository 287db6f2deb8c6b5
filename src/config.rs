//! Configuration: a `PipelineConfig` deserialized from an optional TOML
//! file, with credentials always sourced from the environment rather than
//! the file — the same separation the teacher's `AgentBackend` draws
//! between backend selection and API key lookup.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::context::Dialect;
use crate::error::PipelineError;
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::openai::OpenAiProvider;
use crate::llm::{LlmProvider, ProviderKind};

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dialect: ConfiguredDialect,
    #[serde(default = "default_row_limit")]
    pub row_limit_default: u32,
    #[serde(default)]
    pub parallel: ParallelConfig,
}

fn default_row_limit() -> u32 {
    1000
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub enum ConfiguredDialect {
    #[default]
    #[serde(rename = "DB2")]
    Db2,
    #[serde(rename = "SQLite")]
    Sqlite,
}

impl From<ConfiguredDialect> for Dialect {
    fn from(value: ConfiguredDialect) -> Self {
        match value {
            ConfiguredDialect::Db2 => Dialect::Db2,
            ConfiguredDialect::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParallelConfig {
    #[serde(default, rename = "providers")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub preferred: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: String,
    pub model: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dialect: ConfiguredDialect::default(),
            row_limit_default: default_row_limit(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PipelineError::Config(format!("could not read {}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&text)
    }

    /// Build a live provider for each configured entry whose API key
    /// environment variable is set, reading credentials the way
    /// `AgentBackend::from_env` does — never from the TOML itself.
    pub fn build_providers(&self) -> Vec<Arc<dyn LlmProvider>> {
        self.parallel
            .providers
            .iter()
            .filter_map(|entry| {
                let kind = ProviderKind::from_str(&entry.kind)?;
                let key = std::env::var(kind.env_var()).ok();
                let provider: Arc<dyn LlmProvider> = match kind {
                    ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
                        key,
                        entry.model.clone().unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
                    )),
                    ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
                        key,
                        entry.model.clone().unwrap_or_else(|| "gpt-4o".to_string()),
                    )),
                };
                Some(provider)
            })
            .collect()
    }

    pub fn preferred_providers(&self) -> HashSet<String> {
        self.parallel.preferred.iter().cloned().collect()
    }
}
