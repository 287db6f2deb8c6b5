//! Request-scoped context threaded read-only through every agent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Target SQL dialect for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Dialect {
    #[default]
    Db2,
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Db2 => "DB2",
            Dialect::Sqlite => "SQLite",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable context built once per request from the question and the
/// schema registry. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub question: String,
    pub schema_info: String,
    pub data_dictionary: String,
    pub tables_available: Vec<String>,
    pub columns_available: HashMap<String, Vec<String>>,
    pub dialect: Dialect,
}

impl QueryContext {
    pub fn new(
        question: impl Into<String>,
        schema_info: impl Into<String>,
        data_dictionary: impl Into<String>,
        tables_available: Vec<String>,
        columns_available: HashMap<String, Vec<String>>,
        dialect: Dialect,
    ) -> Self {
        Self {
            question: question.into(),
            schema_info: schema_info.into(),
            data_dictionary: data_dictionary.into(),
            tables_available,
            columns_available,
            dialect,
        }
    }

    /// Case-insensitive lookup of a table's registered columns.
    pub fn columns_for_table(&self, table: &str) -> Option<&Vec<String>> {
        self.columns_available
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, cols)| cols)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables_available
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }
}

/// Standard response shape returned by every agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub message: String,
    pub data: HashMap<String, serde_json::Value>,
    pub confidence: f64,
    pub suggestions: Vec<String>,
}

impl AgentResponse {
    pub fn new(success: bool, message: impl Into<String>, confidence: f64) -> Self {
        Self {
            success,
            message: message.into(),
            data: HashMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
            suggestions: Vec::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.to_string(), v);
        }
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.data
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// One entry in the orchestrator's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub agent: String,
    pub success: bool,
    pub message: String,
    pub confidence: Option<f64>,
    pub extra: HashMap<String, serde_json::Value>,
}

/// Tally of what the pipeline actually changed, surfaced to callers so they
/// don't have to re-derive it from `processing_log`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Improvements {
    pub syntax_corrections: usize,
    pub where_enhancements: usize,
    pub optimizations: usize,
    pub column_fixes: usize,
    pub regeneration_needed: bool,
}

/// Final, caller-facing result of running the full pipeline on one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub final_query: String,
    pub original_query: String,
    pub processing_log: Vec<ProcessingStep>,
    pub overall_confidence: f64,
    pub regeneration_attempted: bool,
    pub improvements: Improvements,
}

/// Answer shape every LLM provider must return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnswer {
    pub sql_query: String,
    pub explanation: String,
    #[serde(default)]
    pub tables_used: Vec<String>,
    #[serde(default)]
    pub columns_used: Vec<String>,
    #[serde(default, rename = "visualization_type")]
    pub visualization_hint: String,
    #[serde(default)]
    pub confidence: f64,
}
