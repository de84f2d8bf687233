//! Deterministic reconciliation of documentation titles with catalog names.
//!
//! Three passes are tried in order and the first hit wins: exact
//! (case-insensitive), bidirectional substring, then token overlap. The
//! model-assisted pass lives in the engine crate and feeds its suggestion back
//! through [`NameResolver::resolve_suggestion`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::Report;

const MIN_STEM_LEN: usize = 4;
pub const NO_MATCH: &str = "NO MATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Substring,
    TokenOverlap,
    Suggested,
}

#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub report: &'a Report,
    pub method: MatchMethod,
    pub score: f32,
}

pub struct NameResolver<'a> {
    catalog: &'a [Report],
}

impl<'a> NameResolver<'a> {
    pub fn new(catalog: &'a [Report]) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, title: &str) -> Option<Resolution<'a>> {
        let query = title.trim();
        if query.is_empty() {
            return None;
        }
        self.exact(query)
            .or_else(|| self.substring(query))
            .or_else(|| self.token_overlap(query))
    }

    pub fn exact(&self, query: &str) -> Option<Resolution<'a>> {
        let query = query.trim();
        self.catalog
            .iter()
            .find(|report| report.name.trim().eq_ignore_ascii_case(query))
            .map(|report| Resolution {
                report,
                method: MatchMethod::Exact,
                score: 1.0,
            })
    }

    pub fn substring(&self, query: &str) -> Option<Resolution<'a>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        self.catalog
            .iter()
            .find(|report| {
                let name = report.name.trim().to_lowercase();
                !name.is_empty() && (name.contains(&query) || query.contains(&name))
            })
            .map(|report| Resolution {
                report,
                method: MatchMethod::Substring,
                score: 1.0,
            })
    }

    /// Highest token-overlap score above zero; ties keep catalog order.
    pub fn token_overlap(&self, query: &str) -> Option<Resolution<'a>> {
        let mut best: Option<Resolution<'a>> = None;
        for report in self.catalog {
            let score = token_overlap_score(query, &report.name);
            if score <= 0.0 {
                continue;
            }
            if best.map_or(true, |current| score > current.score) {
                best = Some(Resolution {
                    report,
                    method: MatchMethod::TokenOverlap,
                    score,
                });
            }
        }
        best
    }

    /// Maps a free-text model suggestion onto the catalog: exact match on the
    /// cleaned name, then token overlap against every catalog name.
    pub fn resolve_suggestion(&self, reply: &str) -> Option<Resolution<'a>> {
        let suggestion = clean_suggestion(reply)?;
        self.exact(&suggestion)
            .or_else(|| self.token_overlap(&suggestion))
            .map(|resolution| Resolution {
                method: MatchMethod::Suggested,
                ..resolution
            })
    }
}

static FILLER_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:the\s+)?(?:best|closest|most\s+likely)?\s*(?:matching\s+)?(?:match|report(?:\s+name)?|answer)\s*(?:is\s*:?|:|-)\s*",
    )
    .expect("valid filler regex")
});

/// Strips quoting and filler phrases from a model reply; `None` when the
/// reply says there is no match anywhere in its first line.
pub fn clean_suggestion(reply: &str) -> Option<String> {
    let first_line = reply.lines().map(str::trim).find(|line| !line.is_empty())?;
    let stripped = FILLER_PREFIX.replace(first_line, "");
    let cleaned = stripped
        .trim()
        .trim_end_matches('.')
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '“' | '”'))
        .trim_end_matches('.')
        .trim();
    let upper = cleaned.to_uppercase();
    if cleaned.is_empty() || upper.contains(NO_MATCH) || upper == "NONE" {
        return None;
    }
    Some(cleaned.to_string())
}

/// `matched tokens / max(token counts)` after [`tokenize`].
pub fn token_overlap_score(a: &str, b: &str) -> f32 {
    let left = tokenize(a);
    let right = tokenize(b);
    let denominator = left.len().max(right.len());
    if denominator == 0 {
        return 0.0;
    }
    let matches = left
        .iter()
        .filter(|token| right.iter().any(|other| tokens_match(token, other)))
        .count();
    matches as f32 / denominator as f32
}

/// Lower-cased tokens split on space, hyphen, underscore, period, comma and
/// camel-case boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '.' | ','))
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .flat_map(split_camel)
        .map(|token| token.to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn split_camel(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0usize;
    for i in 1..chars.len() {
        let (idx, ch) = chars[i];
        let prev = chars[i - 1].1;
        let next_lower = chars.get(i + 1).map_or(false, |(_, c)| c.is_lowercase());
        let boundary = (prev.is_lowercase() && ch.is_uppercase())
            || (prev.is_uppercase() && ch.is_uppercase() && next_lower)
            || (prev.is_alphabetic() && ch.is_ascii_digit())
            || (prev.is_ascii_digit() && ch.is_alphabetic());
        if boundary {
            parts.push(&word[start..idx]);
            start = idx;
        }
    }
    parts.push(&word[start..]);
    parts
}

fn tokens_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_STEM_LEN && long.starts_with(short)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Report> {
        vec![
            Report::new("1", "RegionalSalesMonthly", "/Sales/RegionalSalesMonthly"),
            Report::new("2", "Inventory Status", "/Ops/Inventory Status"),
        ]
    }

    #[test]
    fn exact_match_ignores_case_and_padding() {
        let reports = catalog();
        let resolver = NameResolver::new(&reports);
        for query in ["RegionalSalesMonthly", "regionalsalesmonthly", "  RegionalSalesMonthly  "] {
            let hit = resolver.resolve(query).unwrap();
            assert_eq!(hit.report.id, "1");
            assert_eq!(hit.method, MatchMethod::Exact);
        }
    }

    #[test]
    fn substring_works_both_ways() {
        let reports = catalog();
        let resolver = NameResolver::new(&reports);
        assert_eq!(resolver.resolve("inventory").unwrap().report.id, "2");
        let hit = resolver.resolve("Inventory Status (daily)").unwrap();
        assert_eq!(hit.report.id, "2");
        assert_eq!(hit.method, MatchMethod::Substring);
    }

    #[test]
    fn token_overlap_prefers_shared_stems() {
        let reports = catalog();
        let resolver = NameResolver::new(&reports);
        let hit = resolver.resolve("Monthly Sales by Region").unwrap();
        assert_eq!(hit.report.name, "RegionalSalesMonthly");
        assert_eq!(hit.method, MatchMethod::TokenOverlap);
        assert!(hit.score > 0.0);
        assert_eq!(token_overlap_score("Monthly Sales by Region", "Inventory Status"), 0.0);
    }

    #[test]
    fn token_overlap_ties_keep_catalog_order() {
        let reports = vec![
            Report::new("a", "Sales Weekly", "/a"),
            Report::new("b", "Sales Daily", "/b"),
        ];
        let resolver = NameResolver::new(&reports);
        assert_eq!(resolver.token_overlap("sales figures").unwrap().report.id, "a");
    }

    #[test]
    fn unresolvable_title_returns_none() {
        let reports = catalog();
        assert!(NameResolver::new(&reports).resolve("Payroll").is_none());
        assert!(NameResolver::new(&reports).resolve("   ").is_none());
    }

    #[test]
    fn tokenizer_splits_separators_and_camel_case() {
        assert_eq!(
            tokenize("HRHeadcount_by-Dept.2024,v2"),
            vec!["hr", "headcount", "by", "dept", "2024", "v", "2"]
        );
    }

    #[test]
    fn suggestions_are_cleaned() {
        assert_eq!(
            clean_suggestion("The best match is: \"Inventory Status\".").as_deref(),
            Some("Inventory Status")
        );
        assert_eq!(clean_suggestion("Report: `RegionalSalesMonthly`").as_deref(), Some("RegionalSalesMonthly"));
        assert!(clean_suggestion("NO MATCH").is_none());
        assert!(clean_suggestion("no match.").is_none());
        assert!(clean_suggestion("").is_none());
    }

    #[test]
    fn refusals_anywhere_in_the_reply_are_no_match() {
        for reply in [
            "Sorry, there is no match for that request.",
            "I found No Match in the catalog.",
            "The best match is: NO MATCH",
            "None",
        ] {
            assert!(clean_suggestion(reply).is_none(), "{reply:?} was taken as a name");
        }
        let reports = catalog();
        assert!(NameResolver::new(&reports)
            .resolve_suggestion("Unfortunately no match, closest is Inventory Status")
            .is_none());
    }

    #[test]
    fn suggestion_falls_back_to_overlap() {
        let reports = catalog();
        let resolver = NameResolver::new(&reports);
        let hit = resolver.resolve_suggestion("Regional Sales (Monthly)").unwrap();
        assert_eq!(hit.report.id, "1");
        assert_eq!(hit.method, MatchMethod::Suggested);
    }
}
