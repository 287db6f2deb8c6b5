//! Orchestrator (I): wires the five agents into the fixed
//! validate → enhance → optimize → validate-columns → (regenerate →
//! re-validate)? pipeline, and folds their responses into one
//! [`PipelineResult`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::agents::column_validator::ColumnValidatorAgent;
use crate::agents::optimizer::OptimizerAgent;
use crate::agents::predicate_enhancer::PredicateEnhancerAgent;
use crate::agents::regenerator::RegeneratorAgent;
use crate::agents::syntax_validator::SyntaxValidatorAgent;
use crate::agents::Agent;
use crate::context::{AgentResponse, Dialect, Improvements, PipelineResult, ProcessingStep, QueryContext};
use crate::llm::LlmProvider;
use crate::schema::{InMemorySchemaRegistry, SchemaRegistry};

pub struct Orchestrator {
    syntax_validator: SyntaxValidatorAgent,
    predicate_enhancer: PredicateEnhancerAgent,
    optimizer: OptimizerAgent,
    column_validator: ColumnValidatorAgent,
    regenerator: RegeneratorAgent,
}

impl Orchestrator {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self::with_row_limit(provider, 1000)
    }

    pub fn with_row_limit(provider: Option<Arc<dyn LlmProvider>>, row_limit_default: u32) -> Self {
        Self {
            syntax_validator: SyntaxValidatorAgent::new(),
            predicate_enhancer: PredicateEnhancerAgent::new(),
            optimizer: OptimizerAgent::new(row_limit_default),
            column_validator: ColumnValidatorAgent::new(),
            regenerator: RegeneratorAgent::new(provider),
        }
    }

    fn build_context(question: &str, registry: &dyn SchemaRegistry, dialect: Dialect) -> (QueryContext, Option<ProcessingStep>) {
        if registry.tables().is_empty() {
            warn!("no tables loaded in schema registry, substituting default IBM catalog");
            let default = InMemorySchemaRegistry::default_catalog();
            let context = QueryContext::new(
                question,
                default.schema_text(),
                default.dictionary_text(),
                default.tables(),
                default.as_columns_map(),
                dialect,
            );
            let notice = ProcessingStep {
                agent: "SchemaRegistry".to_string(),
                success: true,
                message: "No tables loaded in schema registry, using default IBM schema".to_string(),
                confidence: None,
                extra: HashMap::new(),
            };
            return (context, Some(notice));
        }

        let context = QueryContext::new(
            question,
            registry.schema_text(),
            registry.dictionary_text(),
            registry.tables(),
            registry.as_columns_map(),
            dialect,
        );
        (context, None)
    }

    fn log_step(log: &mut Vec<ProcessingStep>, confidences: &mut Vec<f64>, agent: &str, response: &AgentResponse, extra_keys: &[&str]) {
        confidences.push(response.confidence);
        let mut extra = HashMap::new();
        for key in extra_keys {
            if let Some(v) = response.data.get(*key) {
                extra.insert(key.to_string(), v.clone());
            }
        }
        log.push(ProcessingStep {
            agent: agent.to_string(),
            success: response.success,
            message: response.message.clone(),
            confidence: Some(response.confidence),
            extra,
        });
        info!(agent, success = response.success, confidence = response.confidence, "stage complete");
    }

    /// Run one agent's `process` call, catching any panic so a single
    /// misbehaving stage can never take down the whole pipeline. A caught
    /// panic is recorded as an ordinary failed response rather than
    /// propagated, matching the "agent raises an unexpected exception"
    /// row of the failure semantics table.
    async fn dispatch_stage(agent_name: &'static str, fut: impl std::future::Future<Output = AgentResponse>) -> AgentResponse {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                error!(agent = agent_name, "agent panicked during processing");
                AgentResponse::new(false, format!("{agent_name} panicked during processing"), 0.0)
            }
        }
    }

    fn array_len(response: &AgentResponse, key: &str) -> usize {
        response
            .data
            .get(key)
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }

    /// Run the full pipeline for one question against one initial SQL draft.
    pub async fn process_query(
        &self,
        question: &str,
        sql_query: &str,
        registry: &dyn SchemaRegistry,
        dialect: Dialect,
    ) -> PipelineResult {
        let (context, catalog_notice) = Self::build_context(question, registry, dialect);
        let mut log: Vec<ProcessingStep> = Vec::new();
        let mut confidences: Vec<f64> = Vec::new();
        if let Some(notice) = catalog_notice {
            log.push(notice);
        }

        let mut input: HashMap<String, Value> = HashMap::new();
        input.insert("sql_query".to_string(), Value::String(sql_query.to_string()));
        let d_response = Self::dispatch_stage(self.syntax_validator.name(), self.syntax_validator.process(&input, &context)).await;
        Self::log_step(&mut log, &mut confidences, self.syntax_validator.name(), &d_response, &["corrections", "issues"]);
        let syntax_corrections = Self::array_len(&d_response, "corrections");
        let query_after_d = d_response.get_str("validated_query").unwrap_or_else(|| sql_query.to_string());

        let mut input: HashMap<String, Value> = HashMap::new();
        input.insert("validated_query".to_string(), Value::String(query_after_d.clone()));
        let e_response = Self::dispatch_stage(self.predicate_enhancer.name(), self.predicate_enhancer.process(&input, &context)).await;
        Self::log_step(&mut log, &mut confidences, self.predicate_enhancer.name(), &e_response, &["enhancements"]);
        let where_enhancements = Self::array_len(&e_response, "enhancements");
        let query_after_e = e_response.get_str("enhanced_query").unwrap_or_else(|| query_after_d.clone());

        let mut input: HashMap<String, Value> = HashMap::new();
        input.insert("enhanced_query".to_string(), Value::String(query_after_e.clone()));
        let f_response = Self::dispatch_stage(self.optimizer.name(), self.optimizer.process(&input, &context)).await;
        Self::log_step(&mut log, &mut confidences, self.optimizer.name(), &f_response, &["optimizations"]);
        let optimizations = Self::array_len(&f_response, "optimizations");
        let query_after_f = f_response.get_str("optimized_query").unwrap_or_else(|| query_after_e.clone());

        let mut input: HashMap<String, Value> = HashMap::new();
        input.insert("optimized_query".to_string(), Value::String(query_after_f.clone()));
        let g_response = Self::dispatch_stage(self.column_validator.name(), self.column_validator.process(&input, &context)).await;
        Self::log_step(&mut log, &mut confidences, self.column_validator.name(), &g_response, &["missing_columns", "substitutions_made"]);
        let regeneration_needed = g_response
            .data
            .get("needs_regeneration")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let mut column_fixes = Self::array_len(&g_response, "substitutions_made");

        let mut regeneration_attempted = false;
        let mut final_column_query = g_response.get_str("validated_query").unwrap_or_else(|| query_after_f.clone());

        if !g_response.success && regeneration_needed {
            regeneration_attempted = true;
            let mut input: HashMap<String, Value> = HashMap::new();
            input.insert("validated_query".to_string(), Value::String(final_column_query.clone()));
            if let Some(prompt) = g_response.data.get("regeneration_prompt").cloned() {
                input.insert("regeneration_prompt".to_string(), prompt);
            }
            let h_response = Self::dispatch_stage(self.regenerator.name(), self.regenerator.process(&input, &context)).await;
            Self::log_step(&mut log, &mut confidences, self.regenerator.name(), &h_response, &["regeneration_method", "substitutions_made"]);

            if h_response.success {
                let regenerated = h_response.get_str("regenerated_query").unwrap_or_else(|| final_column_query.clone());
                let mut input: HashMap<String, Value> = HashMap::new();
                input.insert("optimized_query".to_string(), Value::String(regenerated.clone()));
                let recheck = Self::dispatch_stage(self.column_validator.name(), self.column_validator.process(&input, &context)).await;
                Self::log_step(&mut log, &mut confidences, "ColumnValidation-Recheck", &recheck, &["missing_columns", "substitutions_made"]);

                if recheck.success {
                    column_fixes += Self::array_len(&recheck, "substitutions_made");
                    final_column_query = recheck.get_str("validated_query").unwrap_or(regenerated);
                } else {
                    final_column_query = recheck.get_str("validated_query").unwrap_or(regenerated);
                }
            }
        }

        let overall_confidence = if confidences.is_empty() {
            0.7
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        let critical_failures = usize::from(!d_response.success);
        let final_query_nonempty = !final_column_query.trim().is_empty();
        let overall_success =
            critical_failures == 0 && (syntax_corrections > 0 || final_query_nonempty || overall_confidence > 0.7);

        info!(overall_success, overall_confidence, "pipeline complete");

        PipelineResult {
            success: overall_success,
            final_query: final_column_query,
            original_query: sql_query.to_string(),
            processing_log: log,
            overall_confidence: overall_confidence.clamp(0.0, 1.0),
            regeneration_attempted,
            improvements: Improvements {
                syntax_corrections,
                where_enhancements,
                optimizations,
                column_fixes,
                regeneration_needed,
            },
        }
    }

    /// Human-readable walk through `processing_log`, for CLI / debug output.
    pub fn explain_processing(result: &PipelineResult) -> String {
        let mut lines = vec![format!(
            "Pipeline {} with {:.0}% confidence",
            if result.success { "succeeded" } else { "did not fully succeed" },
            result.overall_confidence * 100.0
        )];
        for (i, step) in result.processing_log.iter().enumerate() {
            lines.push(format!(
                "{}. {} - {} ({})",
                i + 1,
                step.agent,
                step.message,
                if step.success { "ok" } else { "issue" }
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LlmAnswer;
    use crate::llm::mock::MockProvider;
    use std::collections::HashMap as Map;

    fn registry() -> InMemorySchemaRegistry {
        let mut tables = Map::new();
        tables.insert(
            "PROD_MQT_CONSULTING_PIPELINE".to_string(),
            vec!["OPPTY_ID".to_string(), "MARKET".to_string(), "SALES_STAGE".to_string()],
        );
        InMemorySchemaRegistry::new(tables, "dictionary", "schema")
    }

    #[tokio::test]
    async fn clean_query_runs_all_stages_without_regeneration() {
        let orchestrator = Orchestrator::new(None);
        let result = orchestrator
            .process_query(
                "show pipeline by market",
                "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE SALES_STAGE = 'Propose'",
                &registry(),
                Dialect::Db2,
            )
            .await;

        assert!(result.success);
        assert!(!result.regeneration_attempted);
        assert!(!result.final_query.is_empty());
    }

    #[tokio::test]
    async fn dispatch_stage_catches_agent_panic() {
        let response = Orchestrator::dispatch_stage("Exploder", async { panic!("boom") }).await;
        assert!(!response.success);
        assert!(response.message.contains("Exploder"));
    }

    #[tokio::test]
    async fn empty_schema_falls_back_to_default_catalog() {
        let orchestrator = Orchestrator::new(None);
        let empty = InMemorySchemaRegistry::default();
        let result = orchestrator
            .process_query("show won amount", "SELECT WON_AMT FROM PROD_MQT_CONSULTING_PIPELINE", &empty, Dialect::Db2)
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn unmappable_column_triggers_llm_regeneration() {
        let answer = LlmAnswer {
            sql_query: "SELECT OPPTY_ID FROM PROD_MQT_CONSULTING_PIPELINE".into(),
            explanation: "rewrote".into(),
            tables_used: vec![],
            columns_used: vec![],
            visualization_hint: "table".into(),
            confidence: 0.9,
        };
        let provider = Arc::new(MockProvider::answering("Mock", "mock-1", answer));
        let orchestrator = Orchestrator::new(Some(provider));
        let result = orchestrator
            .process_query(
                "get opportunity id",
                "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE ZZZZZ_COLUMN = 1",
                &registry(),
                Dialect::Db2,
            )
            .await;
        assert!(result.regeneration_attempted);
        assert!(result.final_query.contains("OPPTY_ID"));
    }
}
