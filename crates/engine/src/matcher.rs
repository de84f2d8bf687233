use std::sync::Arc;

use reportfinder_core::{NameResolver, Report, NO_MATCH};
use reportfinder_llm::{ChatMessage, Completion, LlmRequest};
use tracing::{debug, warn};

const MAX_CATALOG_NAMES: usize = 500;

/// Asks the model to pick a catalog report when deterministic matching fails.
#[derive(Clone)]
pub struct ReportMatcher {
    llm: Arc<dyn Completion>,
}

impl ReportMatcher {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self { llm }
    }

    /// Any failure, refusal or unusable reply counts as no match.
    pub async fn suggest<'a>(
        &self,
        catalog: &'a [Report],
        query: &str,
        history: &[ChatMessage],
    ) -> Option<&'a Report> {
        if catalog.is_empty() || query.trim().is_empty() {
            return None;
        }
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(query.trim()));
        let request = LlmRequest {
            system: Some(matching_prompt(catalog)),
            messages,
        };
        let reply = match self.llm.complete(&request).await {
            Ok(reply) => reply.content,
            Err(err) => {
                warn!(error = %err, "report matching call failed");
                return None;
            }
        };
        let resolution = NameResolver::new(catalog).resolve_suggestion(&reply);
        match &resolution {
            Some(found) => debug!(report_id = %found.report.id, "model suggested a report"),
            None => debug!(reply = %reply.trim(), "model suggestion did not resolve"),
        }
        resolution.map(|found| found.report)
    }
}

fn matching_prompt(catalog: &[Report]) -> String {
    let mut prompt = String::from(
        "You match a user's request to one report from the catalog below.\n\
         Reply with the single best matching report name exactly as listed and nothing else. \
         If no report fits, reply ",
    );
    prompt.push_str(NO_MATCH);
    prompt.push_str(".\nCatalog:\n");
    for report in catalog.iter().take(MAX_CATALOG_NAMES) {
        prompt.push_str("- ");
        prompt.push_str(&report.name);
        prompt.push('\n');
    }
    prompt
}
