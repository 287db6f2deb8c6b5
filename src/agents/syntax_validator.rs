//! Syntax Validator Agent (D): normalizes SQL toward the target dialect
//! and flags — but does not fail on — unresolved table/column references.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{extract_query, Agent};
use crate::context::{AgentResponse, QueryContext};
use crate::dialect;

pub struct SyntaxValidatorAgent;

impl SyntaxValidatorAgent {
    pub fn new() -> Self {
        Self
    }

    /// DB2 function-name normalizations beyond the dialect translator's
    /// own rule set (`DATEPART` has no dialect-reversal counterpart, so it
    /// lives here rather than in `dialect::translate`).
    fn normalize_functions(query: &str) -> (String, Vec<String>) {
        let mut corrected = query.to_string();
        let mut issues = Vec::new();

        let datepart = Regex::new(r"(?i)DATEPART\s*\(").unwrap();
        if datepart.is_match(&corrected) {
            corrected = datepart.replace_all(&corrected, "EXTRACT(").to_string();
            issues.push("Converted function: DATEPART( to EXTRACT(".to_string());
        }

        (corrected, issues)
    }

    fn extract_tables(query: &str) -> Vec<String> {
        let clean = strip_comments(query);
        let mut tables = Vec::new();
        let from_re = Regex::new(r"(?i)FROM\s+([^\s,]+)").unwrap();
        let join_re = Regex::new(r"(?i)JOIN\s+([^\s,]+)").unwrap();
        for re in [&from_re, &join_re] {
            for cap in re.captures_iter(&clean) {
                let table = cap[1].trim().to_string();
                let upper = table.to_ascii_uppercase();
                if !["SELECT", "WHERE", "GROUP", "ORDER", "HAVING"].contains(&upper.as_str())
                    && !tables.iter().any(|t: &String| t.eq_ignore_ascii_case(&table))
                {
                    tables.push(table);
                }
            }
        }
        tables
    }

    fn validate_columns(query: &str, columns_available: &HashMap<String, Vec<String>>) -> (Vec<String>, Vec<String>) {
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        let qualified = Regex::new(r"\b(\w+)\.(\w+)\b").unwrap();

        for cap in qualified.captures_iter(query) {
            let table = &cap[1];
            let column = &cap[2];
            if let Some((_, table_cols)) = columns_available
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(table))
            {
                if !table_cols.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                    issues.push(format!("Column '{column}' not found in table '{table}'"));
                    let similar: Vec<&String> = table_cols
                        .iter()
                        .filter(|c| {
                            let cu = c.to_ascii_uppercase();
                            let col_u = column.to_ascii_uppercase();
                            cu.contains(&col_u) || col_u.contains(&cu)
                        })
                        .take(3)
                        .collect();
                    if !similar.is_empty() {
                        let names: Vec<String> = similar.into_iter().cloned().collect();
                        suggestions.push(format!("Did you mean: {}?", names.join(", ")));
                    }
                }
            }
        }
        (issues, suggestions)
    }
}

fn strip_comments(query: &str) -> String {
    let line = Regex::new(r"--[^\n]*").unwrap();
    let block = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    block.replace_all(&line.replace_all(query, ""), "").to_string()
}

#[async_trait]
impl Agent for SyntaxValidatorAgent {
    fn name(&self) -> &'static str {
        "SyntaxValidator"
    }

    #[instrument(skip_all, fields(agent = %self.name()))]
    async fn process(&self, input: &HashMap<String, Value>, context: &QueryContext) -> AgentResponse {
        let sql_query = extract_query(input, "sql_query");
        if sql_query.is_empty() {
            return AgentResponse::new(false, "No SQL query provided", 0.0);
        }

        debug!("validating dialect compliance");
        let (corrected, dialect_rewrites) = dialect::translate(&sql_query, context.dialect);
        let (corrected, func_issues) = Self::normalize_functions(&corrected);

        let mut issues: Vec<String> = dialect_rewrites.iter().map(|r| r.reason.clone()).collect();
        issues.extend(func_issues.iter().cloned());

        let mut corrections: Vec<String> = dialect_rewrites
            .iter()
            .map(|r| format!("Syntax: {}", r.reason))
            .collect();
        corrections.extend(func_issues.iter().map(|i| format!("Functions: {i}")));

        debug!("validating table names against schema");
        let tables_used = Self::extract_tables(&corrected);
        let mut suggestions = Vec::new();
        for table in &tables_used {
            if !context.has_table(table) {
                issues.push(format!("Table '{table}' not found in available tables"));
                suggestions.push(format!(
                    "Available tables: {}",
                    context.tables_available.join(", ")
                ));
            }
        }

        debug!("validating column names against schema");
        let (column_issues, column_suggestions) =
            Self::validate_columns(&corrected, &context.columns_available);
        issues.extend(column_issues.iter().cloned());
        suggestions.extend(column_suggestions);

        let confidence = (1.0 - issues.len() as f64 * 0.1).clamp(0.1, 1.0);

        let critical_issues: Vec<&String> = issues
            .iter()
            .filter(|i| {
                let lower = i.to_lowercase();
                !["table", "column", "not found"].iter().any(|w| lower.contains(w))
            })
            .collect();
        let has_improvements = !corrections.is_empty();
        let success = critical_issues.is_empty() || has_improvements;

        let message = if corrections.is_empty() {
            "Syntax validation complete - no issues found".to_string()
        } else {
            format!(
                "Syntax validation complete - {} corrections applied",
                corrections.len()
            )
        };
        info!(success, corrections = corrections.len(), "syntax validation done");

        AgentResponse::new(success, message, confidence)
            .with_data("original_query", &sql_query)
            .with_data("validated_query", &corrected)
            .with_data("issues", &issues)
            .with_data("tables_used", &tables_used)
            .with_data("corrections", &corrections)
            .with_suggestions(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Dialect;
    use std::collections::HashMap as Map;

    fn ctx() -> QueryContext {
        let mut cols = Map::new();
        cols.insert("T".to_string(), vec!["ID".to_string(), "NAME".to_string()]);
        QueryContext::new("q", "schema", "dict", vec!["T".to_string()], cols, Dialect::Db2)
    }

    #[tokio::test]
    async fn converts_limit_to_fetch_first() {
        let agent = SyntaxValidatorAgent::new();
        let mut input = Map::new();
        input.insert("sql_query".to_string(), Value::String("SELECT * FROM T LIMIT 5".into()));
        let resp = agent.process(&input, &ctx()).await;
        assert!(resp.success);
        let validated = resp.get_str("validated_query").unwrap();
        assert!(validated.contains("FETCH FIRST 5 ROWS ONLY"));
    }

    #[tokio::test]
    async fn flags_unknown_table_without_failing() {
        let agent = SyntaxValidatorAgent::new();
        let mut input = Map::new();
        input.insert(
            "sql_query".to_string(),
            Value::String("SELECT * FROM UNKNOWN_TABLE".into()),
        );
        let resp = agent.process(&input, &ctx()).await;
        assert!(resp.success);
        let issues: Vec<String> = serde_json::from_value(resp.data["issues"].clone()).unwrap();
        assert!(issues.iter().any(|i| i.contains("UNKNOWN_TABLE")));
    }

    #[tokio::test]
    async fn empty_query_fails() {
        let agent = SyntaxValidatorAgent::new();
        let resp = agent.process(&Map::new(), &ctx()).await;
        assert!(!resp.success);
    }
}
