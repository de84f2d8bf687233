use once_cell::sync::Lazy;
use regex::Regex;
use reportfinder_llm::{ChatMessage, Completion, LlmRequest};
use tracing::warn;

static CHIT_CHAT: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\s*(?:hi|hello|hey|hiya|howdy|yo|greetings)(?:\s+there)?\s*[!.?]*\s*$",
        r"(?i)^\s*good\s+(?:morning|afternoon|evening|day)\s*[!.?]*\s*$",
        r"(?i)^\s*(?:ping|test(?:ing)?|are\s+you\s+there|anyone\s+there|you\s+there)\s*[!.?]*\s*$",
        r"(?i)^\s*(?:thanks|thank\s+you|thx|cheers)(?:\s+(?:a\s+lot|so\s+much|very\s+much))?\s*[!.?]*\s*$",
        r"(?i)^\s*how\s+are\s+you(?:\s+doing)?(?:\s+today)?\s*[!.?]*\s*$",
        r"(?i)^\s*(?:bye|goodbye|see\s+you)\s*[!.?]*\s*$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid chit-chat pattern"))
    .collect()
});

const FRIENDLY_SYSTEM: &str = "You are a friendly assistant that helps people find reports on a \
reporting server and fill in their parameters. Reply to the user's small talk in one or two short \
sentences and invite them to describe the report they need.";

const FALLBACK_REPLY: &str =
    "Hello! I can help you find a report and fill in its parameters. What are you looking for?";

pub fn is_chit_chat(text: &str) -> bool {
    CHIT_CHAT.iter().any(|pattern| pattern.is_match(text))
}

/// A short friendly answer; the canned reply stands in when the model fails.
pub async fn friendly_reply(llm: &dyn Completion, history: &[ChatMessage]) -> String {
    let request = LlmRequest {
        system: Some(FRIENDLY_SYSTEM.to_string()),
        messages: history.to_vec(),
    };
    match llm.complete(&request).await {
        Ok(response) if !response.content.trim().is_empty() => response.content.trim().to_string(),
        Ok(_) => FALLBACK_REPLY.to_string(),
        Err(err) => {
            warn!(error = %err, "friendly reply failed");
            FALLBACK_REPLY.to_string()
        }
    }
}
