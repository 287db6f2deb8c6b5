//! Deterministic in-memory provider used by the test suite in place of a
//! real network call.

use async_trait::async_trait;
use tokio::time::{sleep, Duration};

use super::LlmProvider;
use crate::context::LlmAnswer;
use crate::error::ProviderError;

/// A canned answer (or error) returned unconditionally, with an optional
/// artificial delay for exercising the Parallel Generator's timeouts.
pub struct MockProvider {
    name: String,
    model: String,
    answer: Result<LlmAnswer, String>,
    delay: Duration,
}

impl MockProvider {
    pub fn answering(name: impl Into<String>, model: impl Into<String>, answer: LlmAnswer) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            answer: Ok(answer),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(name: impl Into<String>, model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            answer: Err(reason.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate_sql(
        &self,
        _question: &str,
        _schema_text: &str,
        _dictionary_text: &str,
    ) -> Result<LlmAnswer, ProviderError> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.answer.clone().map_err(|reason| ProviderError::EmptyResponse {
            provider: format!("{} ({reason})", self.name),
        })
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_connected(&self) -> bool {
        true
    }
}
