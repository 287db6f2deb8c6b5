//! Column Validator Agent (G): verifies every referenced column exists in
//! the schema registry, substitutes known synonyms where possible, and
//! escalates to regeneration when it cannot.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{extract_query, Agent};
use crate::context::{AgentResponse, QueryContext};
use crate::synonyms::find_synonym;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MissingColumn {
    pub table: String,
    pub column: String,
}

pub struct ColumnValidatorAgent;

impl ColumnValidatorAgent {
    pub fn new() -> Self {
        Self
    }

    fn strip_literals(query: &str) -> String {
        let line = Regex::new(r"--[^\n]*").unwrap();
        let block = Regex::new(r"(?s)/\*.*?\*/").unwrap();
        let single = Regex::new(r"'[^']*'").unwrap();
        let double = Regex::new(r#""[^"]*""#).unwrap();
        let cleaned = line.replace_all(query, "");
        let cleaned = block.replace_all(&cleaned, "");
        let cleaned = single.replace_all(&cleaned, "''");
        double.replace_all(&cleaned, "\"\"").to_string()
    }

    /// Map table/alias to the columns referenced against it, drawn from
    /// qualified references, WHERE-clause comparisons, and GROUP BY.
    fn extract_column_references(query: &str) -> HashMap<String, Vec<String>> {
        let clean = Self::strip_literals(query);

        let mut table_aliases: HashMap<String, String> = HashMap::new();
        let mut primary_table: Option<String> = None;
        let table_re = Regex::new(r"(?i)FROM\s+(\w+)(?:\s+(?:AS\s+)?(\w+))?|JOIN\s+(\w+)(?:\s+(?:AS\s+)?(\w+))?")
            .unwrap();
        for cap in table_re.captures_iter(&clean) {
            let table = cap.get(1).or_else(|| cap.get(3)).map(|m| m.as_str().to_ascii_uppercase());
            let alias = cap.get(2).or_else(|| cap.get(4)).map(|m| m.as_str().to_ascii_uppercase());
            if let Some(table) = table {
                if primary_table.is_none() {
                    primary_table = Some(table.clone());
                }
                if let Some(alias) = alias {
                    table_aliases.insert(alias, table);
                }
            }
        }

        let mut referenced: HashMap<String, Vec<String>> = HashMap::new();
        let qualified_re = Regex::new(r"\b(\w+)\.(\w+)\b").unwrap();
        for cap in qualified_re.captures_iter(&clean) {
            let table_ref = cap[1].to_ascii_uppercase();
            let column = cap[2].to_ascii_uppercase();
            let actual_table = table_aliases.get(&table_ref).cloned().unwrap_or(table_ref);
            let cols = referenced.entry(actual_table).or_default();
            if !cols.contains(&column) {
                cols.push(column);
            }
        }

        if let Some(primary) = &primary_table {
            let mut all_columns = Vec::new();
            let where_re = Regex::new(r"(?i)(\w+)\s*(?:=|>|<|>=|<=|<>|!=)\s*(?:'[^']*'|\d+)").unwrap();
            for cap in where_re.captures_iter(&clean) {
                let col = cap[1].to_ascii_uppercase();
                if !["AND", "OR", "NOT", "EXISTS", "NULL", "TRUE", "FALSE"].contains(&col.as_str())
                    && !all_columns.contains(&col)
                {
                    all_columns.push(col);
                }
            }

            let group_re = Regex::new(r"(?i)GROUP\s+BY\s+([\w\s,]+?)(?:\s+ORDER\s+BY|\s+HAVING|\s*$)").unwrap();
            if let Some(cap) = group_re.captures(&clean) {
                for col in cap[1].split(',') {
                    let col = col.trim().to_ascii_uppercase();
                    if !col.is_empty() && col.parse::<u64>().is_err() && !all_columns.contains(&col) {
                        all_columns.push(col);
                    }
                }
            }

            if !all_columns.is_empty() {
                let entry = referenced.entry(primary.clone()).or_default();
                for col in all_columns {
                    if !entry.contains(&col) {
                        entry.push(col);
                    }
                }
            }
        }

        referenced
    }

    fn apply_substitutions(query: &str, mappings: &HashMap<String, String>) -> (String, Vec<String>) {
        let mut corrected = query.to_string();
        let mut substitutions = Vec::new();

        for (old_col, new_col) in mappings {
            let qualified = Regex::new(&format!(r"(?i)\b(\w+\.){}\b", regex::escape(old_col))).unwrap();
            if qualified.is_match(&corrected) {
                corrected = qualified.replace_all(&corrected, format!("${{1}}{new_col}")).to_string();
                substitutions.push(format!("{old_col} -> {new_col}"));
            }

            let unqualified =
                Regex::new(&format!(r"(?i)\b{}\b(?=\s*[,\s]|\s+AS\s|\s*\)|\s*$)", regex::escape(old_col))).unwrap();
            if unqualified.is_match(&corrected) {
                corrected = unqualified.replace_all(&corrected, new_col.as_str()).to_string();
                let note = format!("{old_col} -> {new_col}");
                if !substitutions.contains(&note) {
                    substitutions.push(note);
                }
            }
        }

        (corrected, substitutions)
    }

    fn build_regeneration_prompt(
        missing: &[MissingColumn],
        available: &[String],
        context: &QueryContext,
    ) -> String {
        let missing_list: Vec<String> = missing
            .iter()
            .map(|c| format!("{} (from {})", c.column, c.table))
            .collect();
        let shown: Vec<&String> = available.iter().take(20).collect();
        let ellipsis = if available.len() > 20 { "..." } else { "" };

        format!(
            "The generated SQL query contains columns that don't exist in the database schema.\n\n\
             MISSING COLUMNS:\n{}\n\n\
             AVAILABLE COLUMNS:\n{}{}\n\n\
             Please regenerate the SQL query using only the available columns.\n\
             Consider these alternatives:\n\
             - For OPPORTUNITY_ID: Use OPPTY_ID, OPP_ID, or similar\n\
             - For OPPORTUNITY_VALUE: Use OPPTY_VALUE, DEAL_VALUE, or PPV_AMT\n\
             - For CLIENT_NAME: Use CUSTOMER_NAME or ACCOUNT_NAME\n\
             - For missing date columns: Use available date/time columns\n\n\
             Original question: {}\n\
             Database type: {}\n",
            missing_list.join(", "),
            shown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
            ellipsis,
            context.question,
            context.dialect,
        )
    }
}

#[async_trait]
impl Agent for ColumnValidatorAgent {
    fn name(&self) -> &'static str {
        "ColumnValidation"
    }

    #[instrument(skip_all, fields(agent = %self.name()))]
    async fn process(&self, input: &HashMap<String, Value>, context: &QueryContext) -> AgentResponse {
        let sql_query = extract_query(input, "optimized_query");
        if sql_query.is_empty() {
            return AgentResponse::new(false, "No SQL query provided", 0.0);
        }

        if sql_query.to_ascii_uppercase().contains("WITH ") {
            debug!("query contains CTE - skipping column validation");
            return AgentResponse::new(true, "Query contains CTE - column validation skipped", 0.9)
                .with_data("original_query", &sql_query)
                .with_data("validated_query", &sql_query)
                .with_data("missing_columns", Vec::<MissingColumn>::new())
                .with_data("substitutions_made", Vec::<String>::new())
                .with_data("needs_regeneration", false);
        }

        debug!("extracting column references from query");
        let referenced = Self::extract_column_references(&sql_query);

        let mut missing_columns: Vec<MissingColumn> = Vec::new();
        let mut available_columns: Vec<String> = Vec::new();
        let mut column_mappings: HashMap<String, String> = HashMap::new();

        debug!("validating columns against available schema");
        for (table, columns) in &referenced {
            let Some(table_columns) = context.columns_for_table(table) else {
                continue;
            };
            available_columns.extend(table_columns.iter().cloned());

            for col in columns {
                if !table_columns.iter().any(|tc| tc.eq_ignore_ascii_case(col)) {
                    missing_columns.push(MissingColumn {
                        table: table.clone(),
                        column: col.clone(),
                    });
                    if let Some(similar) = find_synonym(col, table_columns) {
                        column_mappings.insert(col.clone(), similar.to_string());
                    }
                }
            }
        }

        let unmappable: Vec<&MissingColumn> = missing_columns
            .iter()
            .filter(|c| !column_mappings.contains_key(&c.column))
            .collect();
        let needs_regeneration = !unmappable.is_empty();

        let (corrected_query, substitutions_made) = if !column_mappings.is_empty() && !needs_regeneration {
            Self::apply_substitutions(&sql_query, &column_mappings)
        } else {
            (sql_query.clone(), Vec::new())
        };

        let confidence = if missing_columns.is_empty() {
            1.0
        } else if !needs_regeneration {
            0.7
        } else {
            0.3
        };

        let message = if missing_columns.is_empty() {
            "All columns validated successfully".to_string()
        } else {
            format!("Column validation complete - {} missing columns found", missing_columns.len())
        };
        info!(
            missing = missing_columns.len(),
            needs_regeneration,
            "column validation done"
        );

        let mut response = AgentResponse::new(!needs_regeneration, message, confidence)
            .with_data("original_query", &sql_query)
            .with_data("validated_query", &corrected_query)
            .with_data("missing_columns", &missing_columns)
            .with_data("substitutions_made", &substitutions_made)
            .with_data("needs_regeneration", needs_regeneration);

        if needs_regeneration {
            let prompt = Self::build_regeneration_prompt(&missing_columns, &available_columns, context);
            response = response.with_data("regeneration_prompt", &prompt);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Dialect;
    use std::collections::HashMap as Map;

    fn ctx() -> QueryContext {
        let mut cols = Map::new();
        cols.insert(
            "PROD_MQT_CONSULTING_PIPELINE".to_string(),
            vec!["OPPTY_ID".to_string(), "MARKET".to_string(), "SALES_STAGE".to_string()],
        );
        QueryContext::new(
            "q",
            "schema",
            "dict",
            vec!["PROD_MQT_CONSULTING_PIPELINE".to_string()],
            cols,
            Dialect::Db2,
        )
    }

    #[tokio::test]
    async fn substitutes_known_synonym() {
        let agent = ColumnValidatorAgent::new();
        let mut input = Map::new();
        input.insert(
            "optimized_query".to_string(),
            Value::String(
                "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE OPPORTUNITY_ID = 1 GROUP BY MARKET"
                    .into(),
            ),
        );
        let resp = agent.process(&input, &ctx()).await;
        assert!(resp.success);
        let query = resp.get_str("validated_query").unwrap();
        assert!(query.contains("OPPTY_ID"));
        assert!(!query.contains("OPPORTUNITY_ID"));
    }

    #[tokio::test]
    async fn unmappable_column_triggers_regeneration() {
        let agent = ColumnValidatorAgent::new();
        let mut input = Map::new();
        input.insert(
            "optimized_query".to_string(),
            Value::String("SELECT FOO_ID FROM PROD_MQT_CONSULTING_PIPELINE WHERE FOO_ID = 1".into()),
        );
        let resp = agent.process(&input, &ctx()).await;
        assert!(!resp.success);
        let needs: bool = serde_json::from_value(resp.data["needs_regeneration"].clone()).unwrap();
        assert!(needs);
        assert!(resp.data.contains_key("regeneration_prompt"));
    }

    #[tokio::test]
    async fn cte_queries_skip_validation() {
        let agent = ColumnValidatorAgent::new();
        let original = "WITH x AS (SELECT 1 AS FOO) SELECT FOO FROM x";
        let mut input = Map::new();
        input.insert("optimized_query".to_string(), Value::String(original.into()));
        let resp = agent.process(&input, &ctx()).await;
        assert!(resp.success);
        assert_eq!(resp.get_str("validated_query").unwrap(), original);
    }
}
