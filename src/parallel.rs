//! Parallel Generator (J): fans a question out to several LLM providers at
//! once, scores how structurally similar their answers are, and picks the
//! best one. Concurrency is `tokio::JoinSet` rather than a thread pool,
//! and each call is individually bounded by a timeout.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::context::LlmAnswer;
use crate::llm::LlmProvider;

/// One provider's attempt, successful or not.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub provider: String,
    pub model: String,
    pub generation_time_secs: f64,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Answer(LlmAnswer),
    Error(String),
}

impl GenerationAttempt {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Answer(_))
    }
}

/// Agreement level across the valid attempts, mirroring how closely their
/// SELECT/FROM/WHERE clauses line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementLevel {
    High,
    Medium,
    Low,
}

/// Structural comparison of a set of valid generation attempts.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub agreement: AgreementLevel,
    pub select_match: bool,
    pub from_match: bool,
    pub where_similarity: f64,
}

/// Config knob for scoring: providers a caller trusts more than others get
/// a small bonus, distinguishing otherwise-tied answers.
#[derive(Default)]
pub struct ScoringPreferences {
    pub preferred_providers: HashSet<String>,
}

pub struct ParallelGenerator {
    providers: Vec<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl ParallelGenerator {
    /// Only connected providers participate; the rest are dropped up front
    /// the way the original filters its connector list at construction.
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>, timeout: Duration) -> Self {
        let providers = providers.into_iter().filter(|p| p.is_connected()).collect();
        Self { providers, timeout }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    #[instrument(skip_all, fields(providers = self.providers.len()))]
    pub async fn generate(&self, question: &str, schema_text: &str, dictionary_text: &str) -> Vec<GenerationAttempt> {
        let mut set = JoinSet::new();
        for provider in self.providers.iter().take(3).cloned() {
            let question = question.to_string();
            let schema_text = schema_text.to_string();
            let dictionary_text = dictionary_text.to_string();
            let timeout = self.timeout;
            set.spawn(async move {
                let provider_name = provider.provider_name().to_string();
                let model = provider.model_name().to_string();
                let start = Instant::now();
                let outcome = match tokio::time::timeout(
                    timeout,
                    provider.generate_sql(&question, &schema_text, &dictionary_text),
                )
                .await
                {
                    Ok(Ok(answer)) => AttemptOutcome::Answer(answer),
                    Ok(Err(err)) => AttemptOutcome::Error(err.to_string()),
                    Err(_) => AttemptOutcome::Error(format!("timed out after {}ms", timeout.as_millis())),
                };
                GenerationAttempt {
                    provider: provider_name,
                    model,
                    generation_time_secs: start.elapsed().as_secs_f64(),
                    outcome,
                }
            });
        }

        let mut attempts = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(attempt) => attempts.push(attempt),
                Err(err) => warn!(error = %err, "provider task panicked"),
            }
        }
        info!(attempts = attempts.len(), "parallel generation complete");
        attempts
    }

    /// Structural comparison over the subset of `attempts` that succeeded.
    pub fn compare(attempts: &[GenerationAttempt]) -> Comparison {
        let valid: Vec<&LlmAnswer> = attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Answer(ans) => Some(ans),
                AttemptOutcome::Error(_) => None,
            })
            .collect();

        if valid.len() < 2 {
            return Comparison {
                agreement: AgreementLevel::Low,
                select_match: false,
                from_match: false,
                where_similarity: 0.0,
            };
        }

        let normalized: Vec<String> = valid.iter().map(|a| normalize(&a.sql_query)).collect();
        let selects: HashSet<String> = normalized.iter().map(|q| extract_select(q)).collect();
        let froms: HashSet<String> = normalized.iter().map(|q| extract_from(q)).collect();
        let wheres: Vec<String> = normalized.iter().map(|q| extract_where(q)).collect();

        let select_match = selects.len() == 1;
        let from_match = froms.len() == 1;
        let where_similarity = where_similarity(&wheres);

        let agreement = if select_match && from_match && where_similarity > 0.5 {
            AgreementLevel::High
        } else if select_match || from_match {
            AgreementLevel::Medium
        } else {
            AgreementLevel::Low
        };

        Comparison { agreement, select_match, from_match, where_similarity }
    }

    /// Score every successful attempt and return the highest-scoring one.
    /// `100 * confidence + min(explanation_len / 10, 20) + max(0, 10 -
    /// generation_time) + 5 if the provider is the caller's preferred one`.
    pub fn select_best<'a>(
        attempts: &'a [GenerationAttempt],
        preferences: &ScoringPreferences,
    ) -> Option<&'a GenerationAttempt> {
        attempts
            .iter()
            .filter(|a| a.is_ok())
            .max_by(|a, b| score(a, preferences).partial_cmp(&score(b, preferences)).unwrap())
            .or_else(|| attempts.first())
    }
}

fn score(attempt: &GenerationAttempt, preferences: &ScoringPreferences) -> f64 {
    let AttemptOutcome::Answer(answer) = &attempt.outcome else {
        return f64::MIN;
    };
    let explanation_bonus = (answer.explanation.len() as f64 / 10.0).min(20.0);
    let speed_bonus = (10.0 - attempt.generation_time_secs).max(0.0);
    let preference_bonus = if preferences.preferred_providers.iter().any(|name| name.eq_ignore_ascii_case(&attempt.provider)) {
        5.0
    } else {
        0.0
    };
    100.0 * answer.confidence + explanation_bonus + speed_bonus + preference_bonus
}

fn normalize(query: &str) -> String {
    query.to_ascii_uppercase().replace('\n', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_select(query: &str) -> String {
    query.split("FROM").next().unwrap_or("").trim().to_string()
}

fn extract_from(query: &str) -> String {
    query
        .split("FROM")
        .nth(1)
        .and_then(|rest| rest.split("WHERE").next())
        .and_then(|rest| rest.split("GROUP BY").next())
        .and_then(|rest| rest.split("ORDER BY").next())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn extract_where(query: &str) -> String {
    query
        .split("WHERE")
        .nth(1)
        .and_then(|rest| rest.split("GROUP BY").next())
        .and_then(|rest| rest.split("ORDER BY").next())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Jaccard similarity of `[A-Z_]+` tokens across WHERE clauses. Two empty
/// WHEREs are treated as fully similar.
fn where_similarity(wheres: &[String]) -> f64 {
    let token_re = Regex::new(r"\b[A-Z_]+\b").unwrap();
    let token_sets: Vec<HashSet<String>> = wheres
        .iter()
        .map(|w| token_re.find_iter(w).map(|m| m.as_str().to_string()).collect())
        .collect();

    if token_sets.iter().all(|s| s.is_empty()) {
        return 1.0;
    }

    let mut min_sim = 1.0f64;
    for i in 0..token_sets.len() {
        for j in (i + 1)..token_sets.len() {
            let intersection = token_sets[i].intersection(&token_sets[j]).count();
            let union = token_sets[i].union(&token_sets[j]).count();
            let sim = if union == 0 { 1.0 } else { intersection as f64 / union as f64 };
            min_sim = min_sim.min(sim);
        }
    }
    min_sim
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockProvider;
    use std::time::Duration;

    fn answer(sql: &str, confidence: f64, explanation: &str) -> LlmAnswer {
        LlmAnswer {
            sql_query: sql.into(),
            explanation: explanation.into(),
            tables_used: vec![],
            columns_used: vec![],
            visualization_hint: "table".into(),
            confidence,
        }
    }

    #[tokio::test]
    async fn disconnected_providers_are_dropped_at_construction() {
        let connected = Arc::new(MockProvider::answering("A", "m", answer("SELECT 1", 0.9, "x")));
        let generator = ParallelGenerator::new(vec![connected], Duration::from_secs(1));
        assert_eq!(generator.provider_count(), 1);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let slow = Arc::new(
            MockProvider::answering("Slow", "m", answer("SELECT 1", 0.9, "x")).with_delay(Duration::from_millis(200)),
        );
        let generator = ParallelGenerator::new(vec![slow], Duration::from_millis(20));
        let attempts = generator.generate("q", "schema", "dict").await;
        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].is_ok());
    }

    #[test]
    fn identical_queries_score_high_agreement() {
        let a = GenerationAttempt {
            provider: "A".into(),
            model: "m".into(),
            generation_time_secs: 1.0,
            outcome: AttemptOutcome::Answer(answer(
                "SELECT MARKET FROM T WHERE YEAR = 2024",
                0.9,
                "x",
            )),
        };
        let b = GenerationAttempt {
            provider: "B".into(),
            model: "m".into(),
            generation_time_secs: 1.5,
            outcome: AttemptOutcome::Answer(answer(
                "SELECT MARKET FROM T WHERE YEAR = 2024",
                0.85,
                "y",
            )),
        };
        let comparison = ParallelGenerator::compare(&[a, b]);
        assert_eq!(comparison.agreement, AgreementLevel::High);
    }

    #[test]
    fn best_result_prefers_higher_confidence() {
        let a = GenerationAttempt {
            provider: "A".into(),
            model: "m".into(),
            generation_time_secs: 2.0,
            outcome: AttemptOutcome::Answer(answer("SELECT 1", 0.6, "short")),
        };
        let b = GenerationAttempt {
            provider: "B".into(),
            model: "m".into(),
            generation_time_secs: 2.0,
            outcome: AttemptOutcome::Answer(answer("SELECT 2", 0.95, "short")),
        };
        let attempts = [a, b];
        let best = ParallelGenerator::select_best(&attempts, &ScoringPreferences::default()).unwrap();
        assert_eq!(best.provider, "B");
    }

    #[test]
    fn adding_a_higher_scoring_result_changes_best() {
        let a = GenerationAttempt {
            provider: "A".into(),
            model: "m".into(),
            generation_time_secs: 2.0,
            outcome: AttemptOutcome::Answer(answer("SELECT 1", 0.5, "short")),
        };
        let preferences = ScoringPreferences::default();
        let before_attempts = [a.clone()];
        let best_before = ParallelGenerator::select_best(&before_attempts, &preferences).unwrap();
        assert_eq!(best_before.provider, "A");

        let b = GenerationAttempt {
            provider: "B".into(),
            model: "m".into(),
            generation_time_secs: 2.0,
            outcome: AttemptOutcome::Answer(answer("SELECT 2", 0.99, "short")),
        };
        let after_attempts = [a, b];
        let best_after = ParallelGenerator::select_best(&after_attempts, &preferences).unwrap();
        assert_eq!(best_after.provider, "B");
    }

    #[test]
    fn single_valid_result_is_low_agreement() {
        let a = GenerationAttempt {
            provider: "A".into(),
            model: "m".into(),
            generation_time_secs: 1.0,
            outcome: AttemptOutcome::Answer(answer("SELECT 1", 0.9, "x")),
        };
        let comparison = ParallelGenerator::compare(&[a]);
        assert_eq!(comparison.agreement, AgreementLevel::Low);
    }

    #[test]
    fn select_best_falls_back_to_first_error_when_all_fail() {
        let a = GenerationAttempt {
            provider: "A".into(),
            model: "m".into(),
            generation_time_secs: 1.0,
            outcome: AttemptOutcome::Error("boom".into()),
        };
        let b = GenerationAttempt {
            provider: "B".into(),
            model: "m".into(),
            generation_time_secs: 1.0,
            outcome: AttemptOutcome::Error("also boom".into()),
        };
        let attempts = [a, b];
        let best = ParallelGenerator::select_best(&attempts, &ScoringPreferences::default()).unwrap();
        assert_eq!(best.provider, "A");
    }
}
