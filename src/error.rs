//! Error types for the pipeline.
//!
//! Library code returns [`PipelineError`]; the CLI binary wraps calls in
//! `anyhow::Result` at the application boundary, matching the split used
//! throughout the teacher crate between typed library errors and
//! `anyhow`-flavored application glue.

use thiserror::Error;

/// Failure modes of an individual LLM provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} is disconnected: {reason}")]
    Disconnected { provider: String, reason: String },

    #[error("network error calling {provider}: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("could not parse {provider} response as JSON: {source}")]
    Parse {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} response contained no usable content")]
    EmptyResponse { provider: String },

    #[error("{provider} call timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Disconnected { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::Http { provider, .. }
            | ProviderError::Parse { provider, .. }
            | ProviderError::EmptyResponse { provider }
            | ProviderError::Timeout { provider, .. } => provider,
        }
    }
}

/// Errors the orchestrator itself can surface. Agents never propagate these
/// across the orchestrator boundary (see `orchestrator::dispatch_stage`);
/// they are recorded as failed `ProcessingStep`s instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no SQL query was provided")]
    EmptyQuery,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
