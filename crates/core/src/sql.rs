//! Extraction of a single SQL statement from free-form model output.
//!
//! Completion models wrap SQL in a variety of delimiters. Patterns are tried
//! in priority order: a code fence with a language tag, a plain code fence,
//! then raw text with stray delimiters stripped.

use std::sync::OnceLock;

use regex::Regex;

/// Fenced-block patterns in priority order. All are dot-matches-newline so a
/// multi-line statement is captured whole.
fn fence_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?s)```sql\s*\n(.*?)\n?```",
            r"(?s)`sql\n(.*?)`",
            r"(?s)```\s*\n(.*?)\n?```",
            r"(?s)```(.*?)```",
            r"(?s)`sql(.*?)`",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("fence pattern is valid"))
        .collect()
    })
}

/// Extract a single SQL statement from a completion response.
///
/// Returns an empty string only when the response itself is empty; callers
/// treat an empty statement as a generation failure.
pub fn extract_sql(response: &str) -> String {
    for pattern in fence_patterns() {
        if let Some(caps) = pattern.captures(response) {
            return strip_sql_keyword(caps[1].trim()).to_string();
        }
    }

    // No fenced block: treat the whole response as the statement and strip
    // any dangling delimiters the model left behind.
    let mut sql = response.trim();
    for prefix in ["::sql", "```sql", "```", "`sql", "`"] {
        if let Some(rest) = sql.strip_prefix(prefix) {
            sql = rest.trim_start();
            break;
        }
    }
    for suffix in ["```", "`"] {
        if let Some(rest) = sql.strip_suffix(suffix) {
            sql = rest.trim_end();
            break;
        }
    }
    strip_sql_keyword(sql.trim()).to_string()
}

/// Drop a leading `sql` keyword some models prepend to the statement.
fn strip_sql_keyword(sql: &str) -> &str {
    match sql.get(..3) {
        Some(prefix)
            if prefix.eq_ignore_ascii_case("sql")
                && !sql[3..].chars().next().is_some_and(char::is_alphanumeric) =>
        {
            sql[3..].trim_start()
        }
        _ => sql,
    }
}
