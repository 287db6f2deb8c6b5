//! Regenerator Agent (H): last resort when the Column Validator cannot
//! substitute its way to a valid query. Calls the configured LLM provider
//! with the Column Validator's regeneration prompt appended to the data
//! dictionary; when no provider is wired up, or the provider call fails,
//! falls back to a small fixed substitution table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{extract_query, Agent};
use crate::context::{AgentResponse, QueryContext};
use crate::llm::LlmProvider;
use crate::synonyms::FALLBACK_SUBSTITUTIONS;

pub struct RegeneratorAgent {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl RegeneratorAgent {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    fn apply_fallback_substitutions(query: &str) -> (String, Vec<String>) {
        let mut corrected = query.to_string();
        let mut applied = Vec::new();
        for (old_col, new_col) in FALLBACK_SUBSTITUTIONS {
            let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(old_col))).unwrap();
            if pattern.is_match(&corrected) {
                corrected = pattern.replace_all(&corrected, *new_col).to_string();
                applied.push(format!("{old_col} -> {new_col}"));
            }
        }
        (corrected, applied)
    }
}

#[async_trait]
impl Agent for RegeneratorAgent {
    fn name(&self) -> &'static str {
        "SQLRegeneration"
    }

    #[instrument(skip_all, fields(agent = %self.name()))]
    async fn process(&self, input: &HashMap<String, Value>, context: &QueryContext) -> AgentResponse {
        let original_query = extract_query(input, "validated_query");
        let regeneration_prompt = input
            .get("regeneration_prompt")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        if regeneration_prompt.is_empty() {
            return AgentResponse::new(false, "No regeneration prompt provided", 0.0)
                .with_data("original_query", &original_query);
        }

        if let Some(provider) = &self.provider {
            let combined_dictionary = format!("{}\n\n{}", context.data_dictionary, regeneration_prompt);
            info!(provider = provider.provider_name(), "attempting LLM-based regeneration");
            match provider
                .generate_sql(&context.question, &context.schema_info, &combined_dictionary)
                .await
            {
                Ok(answer) => {
                    let confidence = if answer.confidence > 0.0 { answer.confidence } else { 0.8 };
                    return AgentResponse::new(true, "Query regenerated successfully using LLM", confidence)
                        .with_data("original_query", &original_query)
                        .with_data("regenerated_query", &answer.sql_query)
                        .with_data("regeneration_explanation", &answer.explanation)
                        .with_data("regeneration_method", "llm");
                }
                Err(err) => {
                    warn!(error = %err, "LLM regeneration failed, falling back to substitution table");
                }
            }
        }

        let (regenerated, substitutions) = Self::apply_fallback_substitutions(&original_query);

        AgentResponse::new(true, "Query regenerated using fallback substitutions", 0.6)
            .with_data("original_query", &original_query)
            .with_data("regenerated_query", &regenerated)
            .with_data("regeneration_explanation", "Applied known column name substitutions")
            .with_data("regeneration_method", "fallback")
            .with_data("substitutions_made", &substitutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Dialect;
    use crate::context::LlmAnswer;
    use crate::llm::mock::MockProvider;
    use std::collections::HashMap as Map;

    fn ctx() -> QueryContext {
        QueryContext::new("q", "schema", "dict", vec![], Map::new(), Dialect::Db2)
    }

    #[tokio::test]
    async fn uses_llm_when_available() {
        let answer = LlmAnswer {
            sql_query: "SELECT OPPTY_ID FROM T".into(),
            explanation: "fixed".into(),
            tables_used: vec![],
            columns_used: vec![],
            visualization_hint: "table".into(),
            confidence: 0.95,
        };
        let provider = Arc::new(MockProvider::answering("Mock", "mock-1", answer));
        let agent = RegeneratorAgent::new(Some(provider));

        let mut input = Map::new();
        input.insert("validated_query".to_string(), Value::String("SELECT OPPORTUNITY_ID FROM T".into()));
        input.insert("regeneration_prompt".to_string(), Value::String("fix it".into()));

        let resp = agent.process(&input, &ctx()).await;
        assert!(resp.success);
        assert_eq!(resp.get_str("regeneration_method").unwrap(), "llm");
        assert_eq!(resp.get_str("regenerated_query").unwrap(), "SELECT OPPTY_ID FROM T");
    }

    #[tokio::test]
    async fn falls_back_without_provider() {
        let agent = RegeneratorAgent::new(None);
        let mut input = Map::new();
        input.insert(
            "validated_query".to_string(),
            Value::String("SELECT OPPORTUNITY_ID FROM T".into()),
        );
        input.insert("regeneration_prompt".to_string(), Value::String("fix it".into()));

        let resp = agent.process(&input, &ctx()).await;
        assert!(resp.success);
        assert_eq!(resp.get_str("regeneration_method").unwrap(), "fallback");
        assert!(resp.get_str("regenerated_query").unwrap().contains("OPPTY_ID"));
    }

    #[tokio::test]
    async fn missing_prompt_fails() {
        let agent = RegeneratorAgent::new(None);
        let mut input = Map::new();
        input.insert("validated_query".to_string(), Value::String("SELECT 1".into()));
        let resp = agent.process(&input, &ctx()).await;
        assert!(!resp.success);
    }
}
