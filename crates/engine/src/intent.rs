use once_cell::sync::Lazy;
use regex::Regex;

static RESET_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:start\s+(?:over|again)|restart|reset|(?:new|different|another|other)\s+report)\b")
        .expect("valid reset pattern")
});

static CHANGE_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:change|update|modify|adjust|edit|different)\b.*\b(?:param(?:eter)?s?|values?|filters?)\b|^\s*(?:change|update|modify|adjust|edit)\b)",
    )
    .expect("valid change pattern")
});

/// "start over", "a different report" and the like.
pub(crate) fn wants_reset(text: &str) -> bool {
    RESET_INTENT.is_match(text)
}

/// "change the parameters", "update region" and the like.
pub(crate) fn wants_change(text: &str) -> bool {
    CHANGE_INTENT.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_are_recognised() {
        assert!(wants_reset("let's start over"));
        assert!(wants_reset("I need a different report"));
        assert!(!wants_reset("use a different region parameter"));
        assert!(wants_change("change the parameters"));
        assert!(wants_change("use a different region parameter"));
        assert!(wants_change("update"));
        assert!(!wants_change("thanks, looks good"));
        assert!(!wants_reset("2024-Q1"));
    }
}
