//! Schema Registry: the pipeline's only window onto "what tables and
//! columns exist". Deliberately a thin trait over an in-memory lookup —
//! a database-backed implementation is a drop-in future addition that
//! never touches agent code.

use std::collections::HashMap;

/// Read-only view of the warehouse's tables, columns, and descriptive text.
pub trait SchemaRegistry: Send + Sync {
    fn tables(&self) -> Vec<String>;
    fn columns(&self, table: &str) -> Vec<String>;
    fn dictionary_text(&self) -> &str;
    fn schema_text(&self) -> &str;

    fn has_table(&self, table: &str) -> bool {
        self.tables().iter().any(|t| t.eq_ignore_ascii_case(table))
    }

    fn as_columns_map(&self) -> HashMap<String, Vec<String>> {
        self.tables()
            .into_iter()
            .map(|t| {
                let cols = self.columns(&t);
                (t, cols)
            })
            .collect()
    }
}

/// Simple owned-lookup-table registry, the shape the rest of this crate
/// actually constructs and uses.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaRegistry {
    tables: HashMap<String, Vec<String>>,
    dictionary_text: String,
    schema_text: String,
}

impl InMemorySchemaRegistry {
    pub fn new(
        tables: HashMap<String, Vec<String>>,
        dictionary_text: impl Into<String>,
        schema_text: impl Into<String>,
    ) -> Self {
        Self {
            tables,
            dictionary_text: dictionary_text.into(),
            schema_text: schema_text.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The built-in three-table IBM-style pipeline/budget/revenue catalog,
    /// substituted by the orchestrator whenever no registry has been
    /// populated for a request.
    pub fn default_catalog() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            "PROD_MQT_CONSULTING_PIPELINE".to_string(),
            vec![
                "MARKET", "WON_AMT", "SALES_STAGE", "OPPORTUNITY_VALUE", "YEAR", "QUARTER",
                "PPV_AMT", "GEOGRAPHY", "CLIENT_NAME", "SNAPSHOT_LEVEL", "WEEK", "OPPTY_ID",
                "DEAL_ID", "IBM_GEN_AI_IND", "PARTNER_GEN_AI_IND", "CALL_AMT", "UPSIDE_AMT",
                "QUALIFY_PLUS_AMT", "PROPOSE_PLUS_AMT", "NEGOTIATE_PLUS_AMT",
                "OPEN_PIPELINE_AMT", "UT15_NAME", "UT17_NAME", "UT20_NAME", "UT30_NAME",
                "SECTOR", "INDUSTRY", "RELATIVE_QUARTER_MNEUMONIC",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        );
        tables.insert(
            "PROD_MQT_CONSULTING_BUDGET".to_string(),
            vec![
                "REVENUE_BUDGET_AMT",
                "SIGNINGS_BUDGET_AMT",
                "GROSS_PROFIT_BUDGET_AMT",
                "YEAR",
                "QUARTER",
                "MONTH",
                "GEOGRAPHY",
                "MARKET",
                "SECTOR",
                "INDUSTRY",
                "CLIENT_NAME",
                "UT15_NAME",
                "UT17_NAME",
                "UT20_NAME",
                "UT30_NAME",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        );
        tables.insert(
            "PROD_MQT_CONSULTING_REVENUE_ACTUALS".to_string(),
            vec![
                "REVENUE_AMT",
                "GROSS_PROFIT_AMT",
                "REVENUE_AMT_PY",
                "GROSS_PROFIT_AMT_PY",
                "YEAR",
                "QUARTER",
                "MONTH",
                "GEOGRAPHY",
                "MARKET",
                "SECTOR",
                "INDUSTRY",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        );
        Self {
            tables,
            dictionary_text: String::new(),
            schema_text: String::new(),
        }
    }
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn columns(&self, table: &str) -> Vec<String> {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, cols)| cols.clone())
            .unwrap_or_default()
    }

    fn dictionary_text(&self) -> &str {
        &self.dictionary_text
    }

    fn schema_text(&self) -> &str {
        &self.schema_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_three_tables() {
        let reg = InMemorySchemaRegistry::default_catalog();
        assert_eq!(reg.tables().len(), 3);
        assert!(reg.has_table("prod_mqt_consulting_pipeline"));
        assert!(reg.columns("PROD_MQT_CONSULTING_PIPELINE").contains(&"OPPTY_ID".to_string()));
    }

    #[test]
    fn unknown_table_returns_empty_columns() {
        let reg = InMemorySchemaRegistry::default_catalog();
        assert!(reg.columns("NOT_A_TABLE").is_empty());
    }
}
