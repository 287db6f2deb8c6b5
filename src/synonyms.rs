//! Centralized domain synonym dictionary shared by the Column Validator (G)
//! and the Regenerator (H), so H's fallback table can never propose a
//! rewrite G itself would reject. G's table is the superset; H's fallback
//! list below is drawn from it.

/// `(canonical_name, [known alternatives])`, grounded on the column-mapping
/// table used for IBM sales-pipeline data.
pub const COLUMN_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "OPPORTUNITY_ID",
        &["OPPTY_ID", "OPP_ID", "OPPORTUNITY_NUM", "DEAL_ID"],
    ),
    (
        "OPPORTUNITY_VALUE",
        &["OPPTY_VALUE", "DEAL_VALUE", "OPPORTUNITY_AMT", "OPP_VALUE"],
    ),
    (
        "CLIENT_NAME",
        &["CUSTOMER_NAME", "ACCOUNT_NAME", "CLIENT_ID", "CUSTOMER_ID"],
    ),
    ("SALES_STAGE", &["STAGE", "OPPORTUNITY_STAGE", "DEAL_STAGE"]),
    ("WON_AMT", &["WON_AMOUNT", "WON_VALUE", "CLOSED_WON_AMT"]),
    ("REVENUE_AMT", &["REVENUE", "REVENUE_AMOUNT", "ACTUAL_REVENUE"]),
    ("PIPELINE_AMT", &["PIPELINE_VALUE", "PIPELINE_AMOUNT"]),
    ("BUDGET_AMT", &["BUDGET", "BUDGET_AMOUNT", "TARGET_REVENUE"]),
];

/// Look up a known synonym for `missing` among `available` columns.
/// Tries, in order: exact case-insensitive match, forward mapping
/// (`missing` is a canonical name, `available` holds one of its
/// alternatives), reverse mapping (`missing` is itself a known
/// alternative), then substring containment for names longer than 3
/// characters — mirroring the column-validation agent's fallback chain.
pub fn find_synonym<'a>(missing: &str, available: &'a [String]) -> Option<&'a str> {
    let missing_upper = missing.to_ascii_uppercase();

    if let Some(col) = available
        .iter()
        .find(|c| c.eq_ignore_ascii_case(&missing_upper))
    {
        return Some(col.as_str());
    }

    if let Some((_, alts)) = COLUMN_SYNONYMS
        .iter()
        .find(|(canon, _)| *canon == missing_upper)
    {
        for alt in *alts {
            if let Some(col) = available.iter().find(|c| c.eq_ignore_ascii_case(alt)) {
                return Some(col.as_str());
            }
        }
    }

    for (canon, alts) in COLUMN_SYNONYMS {
        if alts.iter().any(|a| *a == missing_upper) {
            if let Some(col) = available.iter().find(|c| c.eq_ignore_ascii_case(canon)) {
                return Some(col.as_str());
            }
        }
    }

    available.iter().find(|c| {
        let col_upper = c.to_ascii_uppercase();
        (missing_upper.contains(&col_upper) || col_upper.contains(&missing_upper))
            && missing_upper.len() > 3
            && col_upper.len() > 3
    }).map(|s| s.as_str())
}

/// Fixed fallback substitutions the Regenerator applies when the LLM is
/// unavailable or its regeneration attempt fails. A strict subset of
/// [`COLUMN_SYNONYMS`]'s canonical names, matching the original system's
/// best-effort rewrite table exactly.
pub const FALLBACK_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("OPPORTUNITY_ID", "OPPTY_ID"),
    ("OPPORTUNITY_VALUE", "PPV_AMT"),
    ("CLIENT_NAME", "CUSTOMER_NAME"),
    ("REVENUE_AMT", "ACTUAL_REVENUE"),
    ("PIPELINE_AMT", "PIPELINE_VALUE"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_mapping_resolves() {
        let available = vec!["OPPTY_ID".to_string(), "MARKET".to_string()];
        assert_eq!(find_synonym("OPPORTUNITY_ID", &available), Some("OPPTY_ID"));
    }

    #[test]
    fn reverse_mapping_resolves() {
        let available = vec!["OPPORTUNITY_VALUE".to_string()];
        assert_eq!(find_synonym("OPPTY_VALUE", &available), Some("OPPORTUNITY_VALUE"));
    }

    #[test]
    fn no_match_returns_none() {
        let available = vec!["MARKET".to_string()];
        assert_eq!(find_synonym("FOO_ID", &available), None);
    }

    #[test]
    fn fallback_table_is_subset_of_forward_synonyms() {
        for (canon, _) in FALLBACK_SUBSTITUTIONS {
            assert!(COLUMN_SYNONYMS.iter().any(|(c, _)| c == canon));
        }
    }
}
