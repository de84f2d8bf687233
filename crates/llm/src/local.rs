use crate::message::{LlmRequest, LlmResponse};

const GREETING: &str =
    "Hello! I can help you find a report and fill in its parameters. What would you like to see?";

/// Offline stand-in that answers the engine's own prompts conservatively:
/// it never suggests a report and never invents parameter values.
pub(crate) fn respond(req: &LlmRequest) -> LlmResponse {
    let system = req.system.as_deref().unwrap_or_default().to_lowercase();
    let content = if system.contains("no match") {
        "NO MATCH"
    } else if system.contains("extract") && system.contains("json") {
        "{}"
    } else if req.last_user().trim().is_empty() {
        "Hello! Tell me which report you are looking for."
    } else {
        GREETING
    };
    LlmResponse::text(content)
}
