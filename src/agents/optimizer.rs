//! Optimizer Agent (F): tactical rewrites — row limiting, and advisory
//! notes on `SELECT *`, joins, and MQT usage. Always succeeds.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

use super::{extract_query, Agent};
use crate::context::{AgentResponse, Dialect, QueryContext};

const AGGREGATE_FNS: &[&str] = &["SUM(", "COUNT(", "AVG(", "MAX(", "MIN("];

pub struct OptimizerAgent {
    row_limit_default: u32,
}

impl OptimizerAgent {
    pub fn new(row_limit_default: u32) -> Self {
        Self { row_limit_default }
    }
}

impl Default for OptimizerAgent {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl Agent for OptimizerAgent {
    fn name(&self) -> &'static str {
        "Optimizer"
    }

    #[instrument(skip_all, fields(agent = %self.name()))]
    async fn process(&self, input: &HashMap<String, Value>, context: &QueryContext) -> AgentResponse {
        let sql_query = extract_query(input, "enhanced_query");
        let mut optimized = sql_query.clone();
        let mut optimizations = Vec::new();

        if optimized.to_ascii_uppercase().contains("PROD_MQT") {
            optimizations.push("Using MQT (Materialized Query Tables) for optimal performance".to_string());
        }

        if optimized.to_ascii_uppercase().contains("SELECT *") {
            optimizations.push("Consider selecting specific columns instead of SELECT *".to_string());
        }

        let upper = optimized.to_ascii_uppercase();
        if !upper.contains("FETCH FIRST") && !upper.contains("LIMIT") {
            let has_aggregation = AGGREGATE_FNS.iter().any(|f| upper.contains(f));
            if !has_aggregation {
                match context.dialect {
                    Dialect::Db2 => {
                        optimized.push_str(&format!(" FETCH FIRST {} ROWS ONLY", self.row_limit_default));
                    }
                    Dialect::Sqlite => {
                        optimized.push_str(&format!(" LIMIT {}", self.row_limit_default));
                    }
                }
                optimizations.push("Added row limit to prevent large result sets".to_string());
            }
        }

        let upper = optimized.to_ascii_uppercase();
        if upper.contains("WHERE") {
            optimizations.push("WHERE clause present - ensure indexes on filter columns".to_string());
        }
        if upper.contains(" JOIN ") {
            optimizations.push("JOINs detected - verify proper join conditions and indexes".to_string());
        }

        let confidence = if optimizations.is_empty() { 0.7 } else { 0.9 };
        info!(optimizations = optimizations.len(), "query optimization done");

        AgentResponse::new(
            true,
            format!("Query optimization complete - {} improvements applied", optimizations.len()),
            confidence,
        )
        .with_data("original_query", &sql_query)
        .with_data("optimized_query", &optimized)
        .with_data("optimizations", &optimizations)
    }
}
