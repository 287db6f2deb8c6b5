//! OpenAI-compatible provider. Also used as the transport for the
//! OpenAI-compatible third-party backends the original system supported
//! (DeepSeek, Mistral, OpenRouter) via a custom `base_url`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use super::{build_prompt, strip_code_fence, LlmProvider};
use crate::context::LlmAnswer;
use crate::error::ProviderError;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    api_key: Option<String>,
    client: reqwest::Client,
    model: String,
    base_url: String,
    connected: bool,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let connected = api_key.as_deref().is_some_and(|k| !k.is_empty());
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.into(),
            base_url: base_url.into(),
            connected,
        }
    }

    pub fn from_env() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_key, model)
    }

    async fn call_api(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| ProviderError::Disconnected {
            provider: "OpenAI".into(),
            reason: "no API key configured".into(),
        })?;

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "model": &self.model,
                "messages": [{"role": "user", "content": prompt}],
                "response_format": {"type": "json_object"},
                "temperature": 0.1
            }))
            .send()
            .await
            .map_err(|source| ProviderError::Network {
                provider: "OpenAI".into(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: "OpenAI".into(),
                status,
                body,
            });
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await.map_err(|source| ProviderError::Network {
            provider: "OpenAI".into(),
            source,
        })?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: "OpenAI".into(),
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    #[instrument(skip(self, schema_text, dictionary_text), fields(provider = "OpenAI"))]
    async fn generate_sql(
        &self,
        question: &str,
        schema_text: &str,
        dictionary_text: &str,
    ) -> Result<LlmAnswer, ProviderError> {
        if !self.connected {
            return Err(ProviderError::Disconnected {
                provider: "OpenAI".into(),
                reason: "provider failed its liveness check at construction".into(),
            });
        }

        let prompt = build_prompt(question, schema_text, dictionary_text);
        let raw = self.call_api(&prompt).await?;
        let cleaned = strip_code_fence(&raw);
        serde_json::from_str(cleaned).map_err(|source| ProviderError::Parse {
            provider: "OpenAI".into(),
            source,
        })
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_disconnected() {
        let provider = OpenAiProvider::new(None, "gpt-4o");
        assert!(!provider.is_connected());
    }
}
