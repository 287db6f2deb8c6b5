//! Predicate Enhancer Agent (E): infers time, geography, and product
//! intent from the question and appends corresponding `WHERE` conjuncts.
//! CTE-bearing queries are never rewritten — only annotated with advisory
//! notes — since a CTE's derived columns cannot be safely targeted by a
//! textual rewrite.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{extract_query, Agent};
use crate::context::{AgentResponse, Dialect, QueryContext};

pub struct PredicateEnhancerAgent;

impl PredicateEnhancerAgent {
    pub fn new() -> Self {
        Self
    }

    fn is_cte(query: &str) -> bool {
        query.to_ascii_uppercase().contains("WITH ")
    }

    fn detect_time_context(question: &str) -> TimeContext {
        let q = question.to_ascii_lowercase();
        let mut ctx = TimeContext::default();

        if ["current", "this month", "this quarter", "today", "now", "recent"]
            .iter()
            .any(|w| q.contains(w))
        {
            ctx.current_period = true;
        }
        if ["this year", "current year", "ytd", "year to date"]
            .iter()
            .any(|w| q.contains(w))
        {
            ctx.current_year = true;
        }
        if q.contains("ytd") || q.contains("year to date") {
            ctx.ytd = true;
        }

        let quarter_re = Regex::new(r"q(\d)|quarter (\d)").unwrap();
        if let Some(cap) = quarter_re.captures(&q) {
            ctx.quarter = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str().to_string());
        }
        let year_re = Regex::new(r"20\d{2}").unwrap();
        if let Some(m) = year_re.find(question) {
            ctx.year = Some(m.as_str().to_string());
        }
        ctx
    }

    fn detect_geographic_context(question: &str) -> GeoContext {
        let q = question.to_ascii_lowercase();
        let mut ctx = GeoContext::default();

        let regions: &[(&str, &[&str])] = &[
            ("AMERICAS", &["americas", "america", "us", "usa", "canada", "latam"]),
            ("EMEA", &["emea", "europe", "middle east", "africa"]),
            ("APAC", &["apac", "asia", "pacific", "asia pacific"]),
            ("JAPAN", &["japan", "jpn"]),
        ];
        for (region, keywords) in regions {
            if keywords.iter().any(|k| q.contains(k)) {
                ctx.region = Some(region.to_string());
                break;
            }
        }

        let countries = ["usa", "uk", "germany", "france", "china", "india", "brazil", "canada"];
        for country in countries {
            if q.contains(country) {
                ctx.country = Some(country.to_ascii_uppercase());
                break;
            }
        }
        ctx
    }

    fn detect_product_context(question: &str) -> ProductContext {
        let q = question.to_ascii_lowercase();
        let mut ctx = ProductContext::default();

        if q.contains("consulting") {
            ctx.product_type = Some("CONSULTING".into());
        } else if q.contains("software") {
            ctx.product_type = Some("SOFTWARE".into());
        } else if q.contains("cloud") {
            ctx.product_type = Some("CLOUD".into());
        } else if q.contains("ai") || q.contains("genai") || q.contains("gen ai") {
            ctx.ai_focus = true;
        }

        let ut_re = Regex::new(r"ut(\d+)").unwrap();
        if let Some(cap) = ut_re.captures(&q) {
            ctx.ut_level = Some(format!("UT{}", &cap[1]));
        }
        ctx
    }

    fn add_time_filters(query: &str, ctx: &TimeContext, dialect: Dialect) -> (String, Vec<String>) {
        let mut enhancements = Vec::new();
        if Self::is_cte(query) {
            if ctx.current_year || ctx.ytd {
                enhancements.push("Confirmed current year analysis context".to_string());
            }
            if ctx.current_period {
                enhancements.push("Confirmed current period analysis context".to_string());
            }
            return (query.to_string(), enhancements);
        }

        let mut enhanced = query.to_string();
        if ctx.current_period {
            let condition = match dialect {
                Dialect::Db2 => "YEAR = YEAR(CURRENT DATE) AND QUARTER = QUARTER(CURRENT DATE)".to_string(),
                Dialect::Sqlite => {
                    "strftime('%Y', date('now')) = CAST(YEAR AS TEXT) AND ((CAST(strftime('%m', date('now')) AS INTEGER) - 1) / 3 + 1) = QUARTER".to_string()
                }
            };
            enhanced = add_where_condition(&enhanced, &condition);
            enhancements.push("Added current quarter filter".to_string());
        } else if let (Some(quarter), Some(year)) = (&ctx.quarter, &ctx.year) {
            let condition = format!("YEAR = {year} AND QUARTER = {quarter}");
            enhanced = add_where_condition(&enhanced, &condition);
            enhancements.push(format!("Added Q{quarter} {year} filter"));
        } else if ctx.ytd {
            let condition = match dialect {
                Dialect::Db2 => "YEAR = YEAR(CURRENT DATE)".to_string(),
                Dialect::Sqlite => "YEAR = CAST(strftime('%Y', date('now')) AS INTEGER)".to_string(),
            };
            enhanced = add_where_condition(&enhanced, &condition);
            enhancements.push("Added Year-to-Date filter".to_string());
        }

        (enhanced, enhancements)
    }

    fn add_geographic_filters(query: &str, ctx: &GeoContext) -> (String, Vec<String>) {
        let mut enhancements = Vec::new();
        if Self::is_cte(query) {
            if let Some(region) = &ctx.region {
                enhancements.push(format!("Confirmed {region} geographic scope"));
            }
            if let Some(country) = &ctx.country {
                enhancements.push(format!("Confirmed {country} country focus"));
            }
            return (query.to_string(), enhancements);
        }

        let mut enhanced = query.to_string();
        if let Some(region) = &ctx.region {
            enhanced = add_where_condition(&enhanced, &format!("GEOGRAPHY = '{region}'"));
            enhancements.push(format!("Added {region} region filter"));
        } else if let Some(country) = &ctx.country {
            enhanced = add_where_condition(&enhanced, &format!("COUNTRY = '{country}'"));
            enhancements.push(format!("Added {country} country filter"));
        }
        (enhanced, enhancements)
    }

    fn add_product_filters(query: &str, ctx: &ProductContext) -> (String, Vec<String>) {
        let mut enhancements = Vec::new();
        let mut enhanced = query.to_string();

        if let Some(prod_type) = &ctx.product_type {
            if query.to_ascii_uppercase().contains(prod_type) {
                enhancements.push(format!("Confirmed {prod_type} table selection"));
            }
        }
        if ctx.ai_focus {
            enhanced = add_where_condition(&enhanced, "(IBM_GEN_AI_IND = 1 OR PARTNER_GEN_AI_IND = 1)");
            enhancements.push("Added AI/GenAI filter".to_string());
        }
        if let Some(ut_level) = &ctx.ut_level {
            enhancements.push(format!("Ready to filter by {ut_level} (specific value needed)"));
        }
        (enhanced, enhancements)
    }

    fn add_business_filters(query: &str, question: &str, context: &QueryContext) -> (String, Vec<String>) {
        let mut enhancements = Vec::new();
        if Self::is_cte(query) {
            enhancements.extend(Self::analyze_cte_for_suggestions(query, question));
            return (query.to_string(), enhancements);
        }

        let mut enhanced = query.to_string();
        let upper = enhanced.to_ascii_uppercase();

        if ["pipeline", "active", "open", "forecast"].iter().any(|w| question.contains(w))
            && upper.contains("SALES_STAGE")
            && !upper.contains("WON")
        {
            enhanced = add_where_condition(&enhanced, "SALES_STAGE NOT IN ('Won', 'Lost')");
            enhancements.push("Added active pipeline filter (excluding Won/Lost)".to_string());
        }

        if context.schema_info.contains("SNAPSHOT_LEVEL") && !upper.contains("SNAPSHOT_LEVEL") {
            enhanced = add_where_condition(&enhanced, "SNAPSHOT_LEVEL = 'W'");
            enhancements.push("Added weekly snapshot filter".to_string());
        }

        if (question.contains("latest") || question.contains("current"))
            && context.schema_info.contains("WEEK")
            && !upper.contains("MAX(WEEK)")
        {
            let condition = "WEEK = (SELECT MAX(WEEK) FROM PROD_MQT_CONSULTING_PIPELINE WHERE YEAR = (SELECT MAX(YEAR) FROM PROD_MQT_CONSULTING_PIPELINE))";
            enhanced = add_where_condition(&enhanced, condition);
            enhancements.push("Added latest week filter".to_string());
        }

        (enhanced, enhancements)
    }

    fn analyze_cte_for_suggestions(query: &str, question: &str) -> Vec<String> {
        let mut suggestions = Vec::new();
        let upper = query.to_ascii_uppercase();
        let q_lower = question.to_lowercase();

        if !["YEAR", "QUARTER", "MONTH", "DATE"].iter().any(|w| upper.contains(w))
            && ["current", "this year", "ytd", "recent"].iter().any(|w| q_lower.contains(w))
        {
            suggestions.push("Added current year context awareness".to_string());
        }
        if !upper.contains("GEOGRAPHY")
            && !upper.contains("MARKET")
            && ["americas", "emea", "apac", "region", "geography"].iter().any(|w| q_lower.contains(w))
        {
            suggestions.push("Noted geographic scope requirement".to_string());
        }
        if upper.contains("SALES_STAGE") {
            if q_lower.contains("won") && q_lower.contains("lost") {
                suggestions.push("Confirmed closed deals focus (Won/Lost)".to_string());
            } else if q_lower.contains("active") || q_lower.contains("open") {
                suggestions.push("Query ready for active pipeline analysis".to_string());
            }
        }
        if suggestions.is_empty() {
            suggestions.push("Query structure validated for business intelligence reporting".to_string());
        }
        suggestions
    }
}

#[derive(Default)]
struct TimeContext {
    current_period: bool,
    current_year: bool,
    ytd: bool,
    quarter: Option<String>,
    year: Option<String>,
}

#[derive(Default)]
struct GeoContext {
    region: Option<String>,
    country: Option<String>,
}

#[derive(Default)]
struct ProductContext {
    product_type: Option<String>,
    ai_focus: bool,
    ut_level: Option<String>,
}

/// Append `condition` to the query's `WHERE` clause, creating one after
/// the outermost `FROM` if none exists yet.
fn add_where_condition(query: &str, condition: &str) -> String {
    let where_re = Regex::new(r"(?i)WHERE\s+").unwrap();
    if let Some(where_match) = where_re.find(query) {
        let where_end = find_where_end(query, where_match.end());
        let existing = query[where_match.end()..where_end].trim();
        let new_where = if !existing.is_empty() && !existing.starts_with('(') {
            format!("{existing} AND {condition}")
        } else {
            condition.to_string()
        };
        format!("{}{}{}", &query[..where_match.end()], new_where, &query[where_end..])
    } else {
        let from_re = Regex::new(r"(?i)FROM\s+\S+(?:\s+\S+)*\s*").unwrap();
        if let Some(from_match) = from_re.find(query) {
            let mut insert_pos = from_match.end();
            let next_clause = Regex::new(r"(?i)\s+(JOIN|GROUP\s+BY|ORDER\s+BY|HAVING)").unwrap();
            if let Some(m) = next_clause.find(&query[insert_pos..]) {
                insert_pos += m.start();
            }
            format!("{} WHERE {} {}", &query[..insert_pos], condition, &query[insert_pos..])
        } else {
            format!("{query} WHERE {condition}")
        }
    }
}

fn find_where_end(query: &str, start_pos: usize) -> usize {
    let next_clause = Regex::new(r"(?i)\s+(GROUP\s+BY|ORDER\s+BY|HAVING|UNION|EXCEPT|INTERSECT)").unwrap();
    match next_clause.find(&query[start_pos..]) {
        Some(m) => start_pos + m.start(),
        None => query.len(),
    }
}

#[async_trait]
impl Agent for PredicateEnhancerAgent {
    fn name(&self) -> &'static str {
        "PredicateEnhancer"
    }

    #[instrument(skip_all, fields(agent = %self.name()))]
    async fn process(&self, input: &HashMap<String, Value>, context: &QueryContext) -> AgentResponse {
        let sql_query = extract_query(input, "validated_query");
        let question = context.question.to_lowercase();

        if sql_query.is_empty() {
            return AgentResponse::new(false, "No SQL query provided", 0.0);
        }

        let mut enhancements = Vec::new();

        debug!("analyzing question for time context");
        let time_ctx = Self::detect_time_context(&question);
        let (enhanced, time_enh) = Self::add_time_filters(&sql_query, &time_ctx, context.dialect);
        enhancements.extend(time_enh);

        debug!("analyzing question for geographic context");
        let geo_ctx = Self::detect_geographic_context(&question);
        let (enhanced, geo_enh) = Self::add_geographic_filters(&enhanced, &geo_ctx);
        enhancements.extend(geo_enh);

        debug!("analyzing question for product context");
        let product_ctx = Self::detect_product_context(&question);
        let (enhanced, prod_enh) = Self::add_product_filters(&enhanced, &product_ctx);
        enhancements.extend(prod_enh);

        debug!("applying standard business logic filters");
        let (enhanced, business_enh) = Self::add_business_filters(&enhanced, &question, context);
        enhancements.extend(business_enh);

        let confidence = if enhancements.is_empty() { 0.6 } else { 0.8 };
        info!(enhancements = enhancements.len(), "where clause enhancement done");

        AgentResponse::new(true, format!("Enhanced WHERE clause with {} contextual filters", enhancements.len()), confidence)
            .with_data("original_query", &sql_query)
            .with_data("enhanced_query", &enhanced)
            .with_data("enhancements", &enhancements)
    }
}
