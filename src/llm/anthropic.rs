//! Anthropic Claude provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use super::{build_prompt, strip_code_fence, LlmProvider};
use crate::context::LlmAnswer;
use crate::error::ProviderError;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub struct AnthropicProvider {
    api_key: Option<String>,
    client: reqwest::Client,
    model: String,
    connected: bool,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        let connected = api_key.as_deref().is_some_and(|k| !k.is_empty());
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.into(),
            connected,
        }
    }

    pub fn from_env() -> Self {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_key, model)
    }

    async fn call_api(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| ProviderError::Disconnected {
            provider: "Anthropic".into(),
            reason: "no API key configured".into(),
        })?;

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": 2000,
                "messages": [{"role": "user", "content": prompt}]
            }))
            .send()
            .await
            .map_err(|source| ProviderError::Network {
                provider: "Anthropic".into(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: "Anthropic".into(),
                status,
                body,
            });
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response.json().await.map_err(|source| ProviderError::Network {
            provider: "Anthropic".into(),
            source,
        })?;

        api_response
            .content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: "Anthropic".into(),
            })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    #[instrument(skip(self, schema_text, dictionary_text), fields(provider = "Anthropic"))]
    async fn generate_sql(
        &self,
        question: &str,
        schema_text: &str,
        dictionary_text: &str,
    ) -> Result<LlmAnswer, ProviderError> {
        if !self.connected {
            return Err(ProviderError::Disconnected {
                provider: "Anthropic".into(),
                reason: "provider failed its liveness check at construction".into(),
            });
        }

        let prompt = build_prompt(question, schema_text, dictionary_text);
        let raw = self.call_api(&prompt).await?;
        let cleaned = strip_code_fence(&raw);
        serde_json::from_str(cleaned).map_err(|source| ProviderError::Parse {
            provider: "Anthropic".into(),
            source,
        })
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
