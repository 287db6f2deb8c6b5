//! LLM Provider Abstraction: a uniform `generate_sql` contract over
//! heterogeneous backends. Concrete providers live in sibling modules;
//! each is constructed with credentials and performs a liveness check at
//! construction time rather than on first call, so a caller can inspect
//! `is_connected()` before ever issuing a request.

pub mod anthropic;
pub mod mock;
pub mod openai;

use async_trait::async_trait;

use crate::context::LlmAnswer;
use crate::error::ProviderError;

/// One backend capable of turning a question into SQL.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate SQL for `question` given the schema and dictionary text.
    /// Implementations strip leading/trailing code fences before parsing
    /// the provider's response as JSON.
    async fn generate_sql(
        &self,
        question: &str,
        schema_text: &str,
        dictionary_text: &str,
    ) -> Result<LlmAnswer, ProviderError>;

    fn provider_name(&self) -> &str;
    fn model_name(&self) -> &str;
    fn is_connected(&self) -> bool;
}

/// Known provider kinds, used by configuration and the scoring bonus in
/// the Parallel Generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl ProviderKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "openai" | "gpt" => Some(ProviderKind::OpenAi),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::OpenAi => "OpenAI",
        }
    }

    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Build the SQL-generation prompt shared across providers: schema,
/// dictionary, the question, DB2 syntax requirements, business context,
/// and the required JSON response shape.
pub fn build_prompt(question: &str, schema_text: &str, dictionary_text: &str) -> String {
    format!(
        r#"You are an expert SQL analyst for an IBM-style sales pipeline warehouse. Generate a precise SQL query based on the user's question.

SCHEMA INFORMATION:
{schema_text}

DATA DICTIONARY KNOWLEDGE BASE:
{dictionary_text}

USER QUESTION: {question}

CRITICAL IBM DB2 SQL SYNTAX REQUIREMENTS:
1. Generate PURE IBM DB2 SQL syntax ONLY
2. Use DB2 date functions: CURRENT DATE, CURRENT TIMESTAMP, YEAR(date), MONTH(date), DAY(date)
3. For current date filtering use: YEAR(column_name) = YEAR(CURRENT DATE)
4. Use DB2 string functions: SUBSTR(), LENGTH(), UPPER()
5. Use DECIMAL(value, precision, scale) for financial calculations
6. Use NULLIF() for division by zero protection
7. Use FETCH FIRST n ROWS ONLY instead of LIMIT

BUSINESS CONTEXT:
- PPV_AMT = AI-based revenue forecast (use for forecasting)
- OPPORTUNITY_VALUE = deal value (use for pipeline value)
- SALES_STAGE values: 'Qualify', 'Propose', 'Negotiate', 'Won', 'Lost'
- Exclude Won/Lost deals for active pipeline
- Use MQT table names (PROD_MQT_CONSULTING_PIPELINE, etc.)

IMPORTANT: Return ONLY a valid JSON object with proper SQL:
{{
    "sql_query": "SELECT ... FROM ... WHERE ...",
    "explanation": "Explanation of the query approach...",
    "tables_used": ["table_names"],
    "columns_used": ["column_names"],
    "visualization_type": "table",
    "confidence": 0.9
}}
"#
    )
}

/// Strip a leading/trailing ```json or ``` code fence, the way every
/// provider's response is sanitized before JSON parsing.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let text = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\":1}");
    }

    #[test]
    fn strips_plain_fence() {
        let text = "```\n{\"a\":1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\":1}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }
}
