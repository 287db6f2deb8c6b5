//! Agent capability shared by every pipeline stage. Modeled as a trait
//! object rather than an inheritance chain: an agent is just a name plus
//! a `process` method, matching the shape of the teacher's `LlmClient`
//! trait (one capability, a handful of methods, nothing more).

pub mod column_validator;
pub mod optimizer;
pub mod predicate_enhancer;
pub mod regenerator;
pub mod syntax_validator;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{AgentResponse, QueryContext};

/// Shared capability of every stage in the pipeline. `process` is async
/// because the Regenerator (H) is the one agent that calls out to an LLM;
/// every other agent returns immediately without ever hitting `.await`.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, input: &HashMap<String, Value>, context: &QueryContext) -> AgentResponse;
}

/// Pull the SQL query out of an agent's `input_data`, preferring `key`
/// (the previous stage's output key) and falling back to `sql_query`.
pub fn extract_query(input: &HashMap<String, Value>, key: &str) -> String {
    input
        .get(key)
        .or_else(|| input.get("sql_query"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
