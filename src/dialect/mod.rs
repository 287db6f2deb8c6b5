//! Dialect Translator: textual, regex-anchored rewrites between DB2 and
//! SQLite. Comments and string literals are excised to placeholders before
//! any rule runs and restored afterward so rewrites never corrupt quoted
//! text, mirroring the comment/string stripping the original syntax
//! validator performs before extracting identifiers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Dialect;

/// Excise single-quoted string literals and `--`/`/* */` comments to
/// placeholders, returning the masked text plus the pieces needed to
/// restore it.
struct Excised {
    masked: String,
    literals: Vec<String>,
}

fn excise(input: &str) -> Excised {
    static STRING_LIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'").unwrap());
    static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").unwrap());
    static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

    let mut literals = Vec::new();
    let mut masked = String::with_capacity(input.len());
    let mut rest = input;

    loop {
        let next = [STRING_LIT.find(rest), LINE_COMMENT.find(rest), BLOCK_COMMENT.find(rest)]
            .into_iter()
            .flatten()
            .min_by_key(|m| m.start());

        match next {
            Some(m) => {
                masked.push_str(&rest[..m.start()]);
                let idx = literals.len();
                literals.push(m.as_str().to_string());
                masked.push_str(&format!("\u{0}LIT{idx}\u{0}"));
                rest = &rest[m.end()..];
            }
            None => {
                masked.push_str(rest);
                break;
            }
        }
    }

    Excised { masked, literals }
}

fn restore(masked: &str, literals: &[String]) -> String {
    let mut out = masked.to_string();
    for (idx, lit) in literals.iter().enumerate() {
        out = out.replace(&format!("\u{0}LIT{idx}\u{0}"), lit);
    }
    out
}

/// A rewrite applied and the human-readable reason it fired, used by the
/// Syntax Validator agent to build its `corrections` list.
#[derive(Debug, Clone)]
pub struct AppliedRewrite {
    pub reason: String,
}

/// Rewrite `query` toward `target`, protecting string literals and
/// comments. Returns the rewritten query plus every rule that fired.
pub fn translate(query: &str, target: Dialect) -> (String, Vec<AppliedRewrite>) {
    let Excised { masked, literals } = excise(query);
    let (rewritten, applied) = match target {
        Dialect::Db2 => to_db2(&masked),
        Dialect::Sqlite => to_sqlite(&masked),
    };
    (restore(&rewritten, &literals), applied)
}

fn to_db2(masked: &str) -> (String, Vec<AppliedRewrite>) {
    let mut query = masked.to_string();
    let mut applied = Vec::new();

    static LIMIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)LIMIT\s+(\d+)").unwrap());
    if LIMIT.is_match(&query) {
        query = LIMIT.replace_all(&query, "FETCH FIRST $1 ROWS ONLY").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted LIMIT to FETCH FIRST (DB2 syntax)".into(),
        });
    }

    static STRFTIME_Y_EQ: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)strftime\s*\(\s*['"]%Y['"]\s*,\s*([^)]+)\s*\)\s*=\s*strftime\s*\(\s*['"]%Y['"]\s*,\s*date\s*\(\s*['"]now['"]\s*\)\s*\)"#).unwrap()
    });
    static STRFTIME_M_EQ: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)strftime\s*\(\s*['"]%m['"]\s*,\s*([^)]+)\s*\)\s*=\s*strftime\s*\(\s*['"]%m['"]\s*,\s*date\s*\(\s*['"]now['"]\s*\)\s*\)"#).unwrap()
    });
    static STRFTIME_Y: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?i)strftime\s*\(\s*['"]%Y['"]\s*,\s*([^)]+)\s*\)"#).unwrap());
    static STRFTIME_M: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?i)strftime\s*\(\s*['"]%m['"]\s*,\s*([^)]+)\s*\)"#).unwrap());
    static DATE_NOW: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?i)date\s*\(\s*['"]now['"]\s*\)"#).unwrap());
    static DATETIME_NOW: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?i)datetime\s*\(\s*['"]now['"]\s*\)"#).unwrap());

    if STRFTIME_Y_EQ.is_match(&query) {
        query = STRFTIME_Y_EQ.replace_all(&query, "YEAR($1) = YEAR(CURRENT DATE)").to_string();
        applied.push(rewrite_note());
    } else if STRFTIME_M_EQ.is_match(&query) {
        query = STRFTIME_M_EQ.replace_all(&query, "MONTH($1) = MONTH(CURRENT DATE)").to_string();
        applied.push(rewrite_note());
    } else if STRFTIME_Y.is_match(&query) {
        query = STRFTIME_Y.replace_all(&query, "YEAR($1)").to_string();
        applied.push(rewrite_note());
    } else if STRFTIME_M.is_match(&query) {
        query = STRFTIME_M.replace_all(&query, "MONTH($1)").to_string();
        applied.push(rewrite_note());
    } else if DATE_NOW.is_match(&query) {
        query = DATE_NOW.replace_all(&query, "CURRENT DATE").to_string();
        applied.push(rewrite_note());
    } else if DATETIME_NOW.is_match(&query) {
        query = DATETIME_NOW.replace_all(&query, "CURRENT TIMESTAMP").to_string();
        applied.push(rewrite_note());
    }

    static QUARTER_FN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\(\(CAST\s*\(strftime\s*\(\s*'%m'\s*,\s*([^)]+)\)\s*AS\s*INTEGER\)\s*-\s*1\)\s*/\s*3\s*\+\s*1\)").unwrap()
    });
    if QUARTER_FN.is_match(&query) {
        query = QUARTER_FN.replace_all(&query, "QUARTER($1)").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted SQLite quarter expression to DB2 QUARTER()".into(),
        });
    }

    static SUBSTRING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)SUBSTRING\s*\(").unwrap());
    if SUBSTRING.is_match(&query) {
        query = SUBSTRING.replace_all(&query, "SUBSTR(").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted function: SUBSTRING( to SUBSTR(".into(),
        });
    }

    static GETDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)GETDATE\s*\(\s*\)").unwrap());
    if GETDATE.is_match(&query) {
        query = GETDATE.replace_all(&query, "CURRENT DATE").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted function: GETDATE() to CURRENT DATE".into(),
        });
    }
    static NOW_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNOW\s*\(\s*\)").unwrap());
    if NOW_FN.is_match(&query) {
        query = NOW_FN.replace_all(&query, "CURRENT TIMESTAMP").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted function: NOW() to CURRENT TIMESTAMP".into(),
        });
    }
    static CURDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)CURDATE\s*\(\s*\)").unwrap());
    if CURDATE.is_match(&query) {
        query = CURDATE.replace_all(&query, "CURRENT DATE").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted CURDATE() to CURRENT DATE".into(),
        });
    }

    static CAST_REAL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)CAST\s*\(([^)]+?)\s+AS\s+REAL\)").unwrap());
    if CAST_REAL.is_match(&query) {
        query = CAST_REAL.replace_all(&query, "CAST($1 AS DOUBLE)").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted CAST(... AS REAL) to CAST(... AS DOUBLE)".into(),
        });
    }

    (query, applied)
}

fn rewrite_note() -> AppliedRewrite {
    AppliedRewrite {
        reason: "Converted SQLite date function to DB2".into(),
    }
}

fn to_sqlite(masked: &str) -> (String, Vec<AppliedRewrite>) {
    let mut query = masked.to_string();
    let mut applied = Vec::new();

    static FETCH_FIRST: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)FETCH\s+FIRST\s+(\d+)\s+ROWS?\s+ONLY").unwrap());
    if FETCH_FIRST.is_match(&query) {
        query = FETCH_FIRST.replace_all(&query, "LIMIT $1").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted FETCH FIRST to LIMIT (SQLite syntax)".into(),
        });
    }

    static YEAR_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bYEAR\s*\(([^)]+)\)").unwrap());
    if YEAR_FN.is_match(&query) {
        query = YEAR_FN
            .replace_all(&query, "strftime('%Y', $1)")
            .to_string();
        applied.push(AppliedRewrite {
            reason: "Converted YEAR() to strftime('%Y', ...)".into(),
        });
    }
    static MONTH_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bMONTH\s*\(([^)]+)\)").unwrap());
    if MONTH_FN.is_match(&query) {
        query = MONTH_FN
            .replace_all(&query, "strftime('%m', $1)")
            .to_string();
        applied.push(AppliedRewrite {
            reason: "Converted MONTH() to strftime('%m', ...)".into(),
        });
    }
    static QUARTER_FN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bQUARTER\s*\(([^)]+)\)").unwrap());
    if QUARTER_FN.is_match(&query) {
        query = QUARTER_FN
            .replace_all(
                &query,
                "((CAST(strftime('%m', $1) AS INTEGER) - 1) / 3 + 1)",
            )
            .to_string();
        applied.push(AppliedRewrite {
            reason: "Converted QUARTER() to a strftime-based expression".into(),
        });
    }

    static CURRENT_TS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)CURRENT\s+TIMESTAMP").unwrap());
    if CURRENT_TS.is_match(&query) {
        query = CURRENT_TS.replace_all(&query, "datetime('now')").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted CURRENT TIMESTAMP to datetime('now')".into(),
        });
    }
    static CURRENT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)CURRENT\s+DATE").unwrap());
    if CURRENT_DATE.is_match(&query) {
        query = CURRENT_DATE.replace_all(&query, "date('now')").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted CURRENT DATE to date('now')".into(),
        });
    }

    static DECIMAL_FN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)DECIMAL\s*\(\s*([^,]+?)\s*,\s*\d+\s*,\s*(\d+)\s*\)").unwrap());
    if DECIMAL_FN.is_match(&query) {
        query = DECIMAL_FN.replace_all(&query, "ROUND($1, $2)").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted DECIMAL(value, precision, scale) to ROUND(value, scale)".into(),
        });
    }

    static SUBSTRING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)SUBSTRING\s*\(").unwrap());
    if SUBSTRING.is_match(&query) {
        query = SUBSTRING.replace_all(&query, "SUBSTR(").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted function: SUBSTRING( to SUBSTR(".into(),
        });
    }

    static FULL_OUTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)FULL\s+OUTER\s+JOIN").unwrap());
    if FULL_OUTER.is_match(&query) {
        query = FULL_OUTER.replace_all(&query, "LEFT JOIN").to_string();
        applied.push(AppliedRewrite {
            reason: "SQLite has no FULL OUTER JOIN; downgraded to LEFT JOIN".into(),
        });
    }

    static NULLS_ORDER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\s+NULLS\s+(FIRST|LAST)\b").unwrap());
    if NULLS_ORDER.is_match(&query) {
        query = NULLS_ORDER.replace_all(&query, "").to_string();
        applied.push(AppliedRewrite {
            reason: "Stripped NULLS FIRST/LAST (unsupported in SQLite)".into(),
        });
    }

    static CAST_DOUBLE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)CAST\s*\(([^)]+?)\s+AS\s+DOUBLE\)").unwrap());
    if CAST_DOUBLE.is_match(&query) {
        query = CAST_DOUBLE.replace_all(&query, "CAST($1 AS REAL)").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted CAST(... AS DOUBLE) to CAST(... AS REAL)".into(),
        });
    }

    static GETDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)GETDATE\s*\(\s*\)").unwrap());
    if GETDATE.is_match(&query) {
        query = GETDATE.replace_all(&query, "date('now')").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted function: GETDATE() to date('now')".into(),
        });
    }
    static CURDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)CURDATE\s*\(\s*\)").unwrap());
    if CURDATE.is_match(&query) {
        query = CURDATE.replace_all(&query, "date('now')").to_string();
        applied.push(AppliedRewrite {
            reason: "Converted CURDATE() to date('now')".into(),
        });
    }

    (query, applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_to_fetch_first() {
        let (out, applied) = translate("SELECT * FROM T LIMIT 10", Dialect::Db2);
        assert!(out.contains("FETCH FIRST 10 ROWS ONLY"));
        assert!(!out.contains("LIMIT"));
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn fetch_first_to_limit() {
        let (out, _) = translate("SELECT * FROM T FETCH FIRST 10 ROWS ONLY", Dialect::Sqlite);
        assert!(out.contains("LIMIT 10"));
    }

    #[test]
    fn does_not_rewrite_inside_string_literal() {
        let (out, _) = translate("SELECT 'LIMIT 5' AS label FROM T LIMIT 5", Dialect::Db2);
        assert!(out.contains("'LIMIT 5'"));
        assert!(out.contains("FETCH FIRST 5 ROWS ONLY"));
    }

    #[test]
    fn does_not_rewrite_inside_comment() {
        let (out, applied) = translate("SELECT * FROM T -- LIMIT 99\nLIMIT 10", Dialect::Db2);
        assert!(out.contains("-- LIMIT 99"));
        assert!(out.contains("FETCH FIRST 10 ROWS ONLY"));
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn date_now_round_trip() {
        let (to_db2, _) = translate("SELECT date('now')", Dialect::Db2);
        assert!(to_db2.contains("CURRENT DATE"));
        let (back, _) = translate(&to_db2, Dialect::Sqlite);
        assert!(back.contains("date('now')"));
    }

    #[test]
    fn full_outer_join_downgrades_for_sqlite() {
        let (out, _) = translate("SELECT * FROM A FULL OUTER JOIN B ON A.ID=B.ID", Dialect::Sqlite);
        assert!(out.contains("LEFT JOIN"));
    }
}
