//! End-to-end scenarios for the full D → E → F → G → (H → G')? pipeline,
//! run against [`InMemorySchemaRegistry`] and [`MockProvider`] so the
//! outcomes are fully deterministic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sql_pipeline_agent::context::{Dialect, LlmAnswer};
use sql_pipeline_agent::llm::mock::MockProvider;
use sql_pipeline_agent::orchestrator::Orchestrator;
use sql_pipeline_agent::parallel::{AgreementLevel, AttemptOutcome, GenerationAttempt, ParallelGenerator, ScoringPreferences};
use sql_pipeline_agent::schema::InMemorySchemaRegistry;

fn pipeline_registry() -> InMemorySchemaRegistry {
    let mut tables = HashMap::new();
    tables.insert(
        "PROD_MQT_CONSULTING_PIPELINE".to_string(),
        vec![
            "OPPTY_ID".to_string(),
            "MARKET".to_string(),
            "SALES_STAGE".to_string(),
            "GEOGRAPHY".to_string(),
            "IBM_GEN_AI_IND".to_string(),
            "PARTNER_GEN_AI_IND".to_string(),
            "YEAR".to_string(),
            "QUARTER".to_string(),
        ],
    );
    InMemorySchemaRegistry::new(tables, "IBM sales pipeline dictionary", "PROD_MQT_CONSULTING_PIPELINE schema")
}

/// S1 — Dialect limit rewrite (DB2 target).
#[tokio::test]
async fn s1_dialect_limit_rewrite() {
    let orchestrator = Orchestrator::new(None);
    let result = orchestrator
        .process_query(
            "top 10 pipeline rows",
            "SELECT * FROM PROD_MQT_CONSULTING_PIPELINE LIMIT 10",
            &pipeline_registry(),
            Dialect::Db2,
        )
        .await;

    assert!(result.success);
    assert!(result.final_query.contains("FETCH FIRST 10 ROWS ONLY"));
    assert!(!result.final_query.contains("LIMIT 10"));
    assert!(result.improvements.syntax_corrections >= 1);
}

/// S2 — Column substitution via the domain synonym dictionary.
#[tokio::test]
async fn s2_column_substitution() {
    let orchestrator = Orchestrator::new(None);
    let result = orchestrator
        .process_query(
            "won deals by market",
            "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE OPPORTUNITY_ID = 1 AND SALES_STAGE = 'Won' GROUP BY MARKET",
            &pipeline_registry(),
            Dialect::Db2,
        )
        .await;

    assert!(result.success);
    assert!(result.final_query.contains("OPPTY_ID"));
    assert!(!result.final_query.contains("OPPORTUNITY_ID"));
    assert!(!result.regeneration_attempted);
    assert!(result.processing_log.iter().any(|s| s.agent == "ColumnValidation"));
}

/// S3 — Regeneration path when no synonym covers the missing column.
#[tokio::test]
async fn s3_regeneration_path_with_llm_success() {
    let answer = LlmAnswer {
        sql_query: "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE MARKET = 'AMERICAS'".into(),
        explanation: "used a real column".into(),
        tables_used: vec!["PROD_MQT_CONSULTING_PIPELINE".into()],
        columns_used: vec!["MARKET".into()],
        visualization_hint: "table".into(),
        confidence: 0.9,
    };
    let provider = Arc::new(MockProvider::answering("Mock", "mock-1", answer));
    let orchestrator = Orchestrator::new(Some(provider));

    let result = orchestrator
        .process_query(
            "deals with a made-up filter",
            "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE FOO_ID = 1",
            &pipeline_registry(),
            Dialect::Db2,
        )
        .await;

    assert!(result.regeneration_attempted);
    assert!(result.processing_log.iter().any(|s| s.agent == "ColumnValidation-Recheck"));
    assert!(result.success);
    assert!(result.final_query.contains("MARKET = 'AMERICAS'"));
}

#[tokio::test]
async fn s3_regeneration_path_without_provider_falls_back() {
    let orchestrator = Orchestrator::new(None);
    let result = orchestrator
        .process_query(
            "deals with a made-up filter",
            "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE FOO_ID = 1",
            &pipeline_registry(),
            Dialect::Db2,
        )
        .await;

    assert!(result.regeneration_attempted);
    assert!(result.processing_log.iter().any(|s| s.agent == "ColumnValidation-Recheck"));
    assert!(result.success);
    assert!(result.final_query.contains("FOO_ID"));
}

/// S4 — CTE pass-through: neither the Predicate Enhancer nor the Column
/// Validator rewrite a CTE-bearing query.
#[tokio::test]
async fn s4_cte_pass_through() {
    let orchestrator = Orchestrator::new(None);
    let original = "WITH recent AS (SELECT MARKET, SALES_STAGE FROM PROD_MQT_CONSULTING_PIPELINE) SELECT MARKET FROM recent";
    let result = orchestrator
        .process_query("recent pipeline by market", original, &pipeline_registry(), Dialect::Db2)
        .await;

    assert!(result.success);
    assert!(!result.regeneration_attempted);
    assert_eq!(result.final_query, original);
}

/// S6 — Predicate enhancement layers three independent conjuncts.
#[tokio::test]
async fn s6_predicate_enhancement_ai_americas_quarter() {
    let orchestrator = Orchestrator::new(None);
    let result = orchestrator
        .process_query(
            "AI pipeline in americas this quarter",
            "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE",
            &pipeline_registry(),
            Dialect::Db2,
        )
        .await;

    assert!(result.success);
    assert!(result.final_query.contains("IBM_GEN_AI_IND = 1 OR PARTNER_GEN_AI_IND = 1"));
    assert!(result.final_query.contains("GEOGRAPHY = 'AMERICAS'"));
    assert!(result.final_query.contains("QUARTER(CURRENT DATE)") || result.final_query.contains("QUARTER"));
}

/// S7 — Default catalog substitution when the caller's registry is empty.
#[tokio::test]
async fn s7_default_catalog_substitution() {
    let orchestrator = Orchestrator::new(None);
    let empty = InMemorySchemaRegistry::default();
    let result = orchestrator
        .process_query("show won amount", "SELECT WON_AMT FROM PROD_MQT_CONSULTING_PIPELINE", &empty, Dialect::Db2)
        .await;

    assert_eq!(result.processing_log[0].agent, "SchemaRegistry");
    assert!(result.processing_log[0].message.contains("default IBM schema"));
    assert!(result.success);
}

fn mock_answer(sql: &str, confidence: f64) -> LlmAnswer {
    LlmAnswer {
        sql_query: sql.into(),
        explanation: "explanation text".into(),
        tables_used: vec![],
        columns_used: vec![],
        visualization_hint: "table".into(),
        confidence,
    }
}

/// S5 — Three providers agreeing on SELECT/FROM/WHERE structure score HIGH
/// agreement, and the highest-confidence answer wins regardless of arrival
/// order.
#[tokio::test]
async fn s5_parallel_consensus_high() {
    let query = "SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE WHERE YEAR = 2024";
    let a = GenerationAttempt {
        provider: "A".into(),
        model: "m".into(),
        generation_time_secs: 1.0,
        outcome: AttemptOutcome::Answer(mock_answer(query, 0.8)),
    };
    let b = GenerationAttempt {
        provider: "B".into(),
        model: "m".into(),
        generation_time_secs: 1.2,
        outcome: AttemptOutcome::Answer(mock_answer(query, 0.95)),
    };
    let c = GenerationAttempt {
        provider: "C".into(),
        model: "m".into(),
        generation_time_secs: 0.9,
        outcome: AttemptOutcome::Answer(mock_answer(query, 0.7)),
    };

    let forward = ParallelGenerator::compare(&[a.clone(), b.clone(), c.clone()]);
    let shuffled = ParallelGenerator::compare(&[c.clone(), a.clone(), b.clone()]);
    assert_eq!(forward.agreement, AgreementLevel::High);
    assert_eq!(shuffled.agreement, AgreementLevel::High);

    let forward_attempts = [a.clone(), b.clone(), c.clone()];
    let best_forward = ParallelGenerator::select_best(&forward_attempts, &ScoringPreferences::default()).unwrap();
    let shuffled_attempts = [c, a, b];
    let best_shuffled = ParallelGenerator::select_best(&shuffled_attempts, &ScoringPreferences::default()).unwrap();
    assert_eq!(best_forward.provider, "B");
    assert_eq!(best_shuffled.provider, "B");
}

/// S8 — A provider that never responds within its timeout is excluded from
/// scoring, and agreement is computed over the remaining valid results.
#[tokio::test]
async fn s8_provider_timeout_excluded_from_scoring() {
    let fast_a = Arc::new(MockProvider::answering(
        "Fast-A",
        "m",
        mock_answer("SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE", 0.9),
    ));
    let fast_b = Arc::new(MockProvider::answering(
        "Fast-B",
        "m",
        mock_answer("SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE", 0.85),
    ));
    let slow = Arc::new(
        MockProvider::answering("Slow", "m", mock_answer("SELECT MARKET FROM PROD_MQT_CONSULTING_PIPELINE", 0.99))
            .with_delay(Duration::from_millis(200)),
    );

    let generator = ParallelGenerator::new(vec![fast_a, fast_b, slow], Duration::from_millis(30));
    let attempts = generator.generate("market pipeline", "schema", "dict").await;

    assert_eq!(attempts.len(), 3);
    let timed_out = attempts.iter().find(|a| a.provider == "Slow").unwrap();
    assert!(!timed_out.is_ok());

    let comparison = ParallelGenerator::compare(&attempts);
    assert_eq!(comparison.agreement, AgreementLevel::High);

    let best = ParallelGenerator::select_best(&attempts, &ScoringPreferences::default()).unwrap();
    assert_ne!(best.provider, "Slow");
}
