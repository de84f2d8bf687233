use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use reportfinder_catalog::ReportCatalog;
use reportfinder_core::{
    lookup_value, missing_required, token_overlap_score, NameResolver, ParameterIssue,
    ParameterValues, Report, ReportParameter, ViewerUrlBuilder,
};
use reportfinder_llm::{ChatMessage, Completion};
use reportfinder_search::SearchClient;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chitchat::{friendly_reply, is_chit_chat};
use crate::error::{EngineError, Result};
use crate::extraction::{extract_pairs, ParameterExtractor};
use crate::intent::{wants_change, wants_reset};
use crate::matcher::ReportMatcher;
use crate::session::{Candidate, SessionContext, Stage};
use crate::store::{InMemorySessionStore, SessionStore, StoreError};

pub const APOLOGY: &str =
    "Sorry, something went wrong on my side. Could you tell me again which report you need?";
pub const BUSY: &str =
    "I'm still processing your previous message. Please try again in a moment.";
const NO_RESULTS: &str = "I couldn't find a report matching that. Could you describe it in more \
detail, for example the subject or the data it should show?";
const ASK_FOR_REPORT: &str = "Which report are you looking for?";

const HISTORY_TURNS: usize = 6;
const MAX_CANDIDATES: usize = 10;

static PICK_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:#|no\.?\s*|number\s+|option\s+|report\s+)?(\d{1,3})\s*[.)]?\s*$")
        .expect("valid pick pattern")
});

/// What a single turn hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    pub stage: Stage,
}

/// Conversation state machine over the catalog, search index and model.
pub struct ReportEngine {
    pub(crate) catalog: ReportCatalog,
    pub(crate) search: SearchClient,
    pub(crate) llm: Arc<dyn Completion>,
    pub(crate) viewer: ViewerUrlBuilder,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) extractor: ParameterExtractor,
    pub(crate) matcher: ReportMatcher,
}

impl ReportEngine {
    pub fn new(
        catalog: ReportCatalog,
        search: SearchClient,
        llm: Arc<dyn Completion>,
        viewer: ViewerUrlBuilder,
    ) -> Self {
        Self {
            catalog,
            search,
            extractor: ParameterExtractor::new(llm.clone()),
            matcher: ReportMatcher::new(llm.clone()),
            llm,
            viewer,
            store: Arc::new(InMemorySessionStore::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Runs one conversational turn. Never fails: errors become an apology
    /// and leave the stored stage untouched.
    pub async fn process_message(&self, session_id: Option<&str>, text: &str) -> ChatReply {
        let session = match self.store.get_or_create(session_id).await {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "session store unavailable");
                return ChatReply {
                    session_id: session_id.unwrap_or_default().to_string(),
                    message: APOLOGY.to_string(),
                    report_url: None,
                    stage: Stage::ReportSelection,
                };
            }
        };
        let text = text.trim();
        let mut working = session.clone();
        if working.repair() {
            warn!(session_id = %working.session_id, stage = %working.stage, "repaired inconsistent session");
        }

        let outcome = if is_chit_chat(text) {
            debug!(session_id = %working.session_id, "chit-chat");
            let mut history = working.recent_history(HISTORY_TURNS).to_vec();
            history.push(ChatMessage::user(text));
            Ok(friendly_reply(self.llm.as_ref(), &history).await)
        } else {
            self.dispatch(&mut working, text).await
        };
        let message = match outcome {
            Ok(message) => message,
            Err(err) => {
                error!(
                    session_id = %session.session_id,
                    stage = %session.stage,
                    error = ?err,
                    "turn failed"
                );
                working = session.clone();
                working.repair();
                APOLOGY.to_string()
            }
        };
        working.record_user(text);
        working.record_assistant(message.clone());

        match self.store.save(working).await {
            Ok(saved) => {
                info!(
                    session_id = %saved.session_id,
                    from = %session.stage,
                    to = %saved.stage,
                    "turn complete"
                );
                ChatReply {
                    session_id: saved.session_id,
                    message,
                    report_url: saved.report_url,
                    stage: saved.stage,
                }
            }
            Err(err) => {
                let message = match &err {
                    StoreError::Conflict { .. } => {
                        warn!(session_id = %session.session_id, error = %err, "concurrent turn rejected");
                        BUSY
                    }
                    StoreError::Unavailable(_) => {
                        error!(session_id = %session.session_id, error = %err, "failed to save session");
                        APOLOGY
                    }
                };
                ChatReply {
                    session_id: session.session_id,
                    message: message.to_string(),
                    report_url: session.report_url,
                    stage: session.stage,
                }
            }
        }
    }

    async fn dispatch(&self, session: &mut SessionContext, text: &str) -> Result<String> {
        if text.is_empty() {
            return Ok(self.stage_prompt(session));
        }
        match session.stage {
            Stage::ReportSelection => self.handle_selection(session, text).await,
            Stage::ParameterFilling => self.handle_parameters(session, text).await,
            Stage::ReportUrlCreation => self.handle_url_creation(session),
            Stage::Completed => self.handle_completed(session, text),
        }
    }

    fn stage_prompt(&self, session: &SessionContext) -> String {
        match (&session.stage, &session.selected_report, &session.report_url) {
            (Stage::Completed, _, Some(url)) => completed_reminder(url),
            (_, Some(report), _) => parameter_prompt(report, &session.parameters),
            _ => ASK_FOR_REPORT.to_string(),
        }
    }

    async fn handle_selection(&self, session: &mut SessionContext, text: &str) -> Result<String> {
        if let Some(report) = self.pick_candidate(session, text).await {
            return Ok(select(session, report, text));
        }
        let catalog = self.catalog.get_reports().await?;
        if let Some(report) = direct_match(&catalog, text) {
            debug!(report_id = %report.id, "report selected directly");
            let report = self.hydrate(report.clone()).await;
            return Ok(select(session, report, text));
        }
        let history = session.recent_history(HISTORY_TURNS).to_vec();
        let mut matches = self.find_reports(&catalog, text, &history).await;
        match matches.len() {
            0 => {
                session.candidates.clear();
                Ok(NO_RESULTS.to_string())
            }
            1 => {
                let report = self.hydrate(matches.remove(0)).await;
                Ok(select(session, report, text))
            }
            _ => {
                session.candidates = matches
                    .iter()
                    .take(MAX_CANDIDATES)
                    .map(Candidate::from)
                    .collect();
                Ok(candidate_list(&session.candidates))
            }
        }
    }

    /// Search hits reconciled with the catalog, deduplicated by report id.
    async fn find_reports(
        &self,
        catalog: &[Report],
        text: &str,
        history: &[ChatMessage],
    ) -> Vec<Report> {
        let hits = self.search.search_reports(text).await;
        let resolver = NameResolver::new(catalog);
        let mut seen_titles = HashSet::new();
        let mut found: Vec<Report> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();
        for hit in &hits {
            let Some(title) = self.search.mapping().title_of(hit) else {
                continue;
            };
            if !seen_titles.insert(title.to_lowercase()) {
                continue;
            }
            match resolver.resolve(&title) {
                Some(resolution) => {
                    if !found.iter().any(|report| report.id == resolution.report.id) {
                        found.push(resolution.report.clone());
                    }
                }
                None => unresolved.push(title),
            }
        }
        debug!(hits = hits.len(), resolved = found.len(), unresolved = unresolved.len(), "search reconciled");
        if !found.is_empty() {
            return found;
        }
        if let Some(report) = self.catalog.get_report_by_name(text).await {
            return vec![report];
        }
        let query = if unresolved.is_empty() {
            text.to_string()
        } else {
            format!("{text}\nDocumentation titles: {}", unresolved.join("; "))
        };
        self.matcher
            .suggest(catalog, &query, history)
            .await
            .cloned()
            .into_iter()
            .collect()
    }

    async fn pick_candidate(&self, session: &SessionContext, text: &str) -> Option<Report> {
        if session.candidates.is_empty() {
            return None;
        }
        let chosen = match PICK_NUMBER.captures(text) {
            Some(caps) => caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| session.candidates.get(index)),
            None => candidate_by_name(&session.candidates, text),
        }?;
        debug!(report_id = %chosen.id, "candidate picked");
        self.catalog.get_report_by_id(&chosen.id).await
    }

    async fn hydrate(&self, mut report: Report) -> Report {
        if report.parameters.is_empty() {
            report.parameters = self.catalog.get_report_parameters(&report.id).await;
        }
        report
    }

    async fn handle_parameters(&self, session: &mut SessionContext, text: &str) -> Result<String> {
        let report = session
            .selected_report
            .clone()
            .ok_or(EngineError::NoReportSelected)?;
        let pending = missing_required(&report, &session.parameters);
        let history = session.recent_history(HISTORY_TURNS).to_vec();
        let extracted = self
            .extractor
            .extract(&report, &session.parameters, text, pending.first().copied(), &history)
            .await;
        let issues = merge_values(&report, &mut session.parameters, extracted);
        let mut reply = issue_notes(&issues);
        if missing_required(&report, &session.parameters).is_empty() {
            session.stage = Stage::ReportUrlCreation;
            reply.push(self.handle_url_creation(session)?);
        } else {
            reply.push(parameter_prompt(&report, &session.parameters));
        }
        Ok(reply.join("\n"))
    }

    fn handle_url_creation(&self, session: &mut SessionContext) -> Result<String> {
        let report = session
            .selected_report
            .as_ref()
            .ok_or(EngineError::NoReportSelected)?;
        if !missing_required(report, &session.parameters).is_empty() {
            let prompt = parameter_prompt(report, &session.parameters);
            session.stage = Stage::ParameterFilling;
            return Ok(prompt);
        }
        let url = self.viewer.build(report, &session.parameters)?;
        let message = format!("Here is the link to **{}**:\n{url}", report.name);
        info!(session_id = %session.session_id, report_id = %report.id, "report url created");
        session.report_url = Some(url);
        session.stage = Stage::Completed;
        Ok(message)
    }

    fn handle_completed(&self, session: &mut SessionContext, text: &str) -> Result<String> {
        if wants_reset(text) {
            session.reset();
            return Ok(format!("Okay, let's start over. {ASK_FOR_REPORT}"));
        }
        let report = session
            .selected_report
            .clone()
            .ok_or(EngineError::NoReportSelected)?;
        let pairs = extract_pairs(&report, text);
        if wants_change(text) || !pairs.is_empty() {
            session.report_url = None;
            session.stage = Stage::ParameterFilling;
            let issues = merge_values(&report, &mut session.parameters, pairs);
            let mut reply = issue_notes(&issues);
            reply.push(format!(
                "Current values: {}.",
                current_values(&report, &session.parameters)
            ));
            reply.push(
                "Tell me the values you want to change, or say \"go\" to build the new link."
                    .to_string(),
            );
            return Ok(reply.join("\n"));
        }
        match &session.report_url {
            Some(url) => Ok(completed_reminder(url)),
            None => self.handle_url_creation(session),
        }
    }
}

/// Exact catalog id or exact (case-insensitive) name.
fn direct_match<'a>(catalog: &'a [Report], text: &str) -> Option<&'a Report> {
    let wanted = text.trim();
    catalog
        .iter()
        .find(|report| report.id.eq_ignore_ascii_case(wanted))
        .or_else(|| NameResolver::new(catalog).exact(wanted).map(|found| found.report))
}

fn candidate_by_name<'a>(candidates: &'a [Candidate], text: &str) -> Option<&'a Candidate> {
    let wanted = text.trim().to_lowercase();
    if let Some(exact) = candidates
        .iter()
        .find(|c| c.name.to_lowercase() == wanted || c.id.to_lowercase() == wanted)
    {
        return Some(exact);
    }
    let partial: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            let name = c.name.to_lowercase();
            wanted.contains(&name) || (wanted.len() >= 3 && name.contains(&wanted))
        })
        .collect();
    match partial.as_slice() {
        [only] => return Some(*only),
        [] => {}
        _ => return None,
    }
    let mut scored: Vec<(f32, &Candidate)> = candidates
        .iter()
        .map(|c| (token_overlap_score(&wanted, &c.name), c))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    match scored.as_slice() {
        [(_, best)] => Some(*best),
        [(top, best), (runner_up, _), ..] if top > runner_up => Some(*best),
        _ => None,
    }
}

fn select(session: &mut SessionContext, report: Report, text: &str) -> String {
    let pairs = extract_pairs(&report, text);
    let mut reply = vec![match &report.description {
        Some(description) => format!("I found **{}**: {description}", report.name),
        None => format!("I found **{}**.", report.name),
    }];
    session.select_report(report.clone());
    reply.extend(issue_notes(&merge_values(&report, &mut session.parameters, pairs)));
    reply.push(parameter_prompt(&report, &session.parameters));
    reply.join("\n")
}

/// Merges extracted values under catalog names; disallowed values are
/// reported instead of stored. Allowed values match case-insensitively but
/// are stored with catalog spelling.
fn merge_values(
    report: &Report,
    target: &mut ParameterValues,
    values: ParameterValues,
) -> Vec<ParameterIssue> {
    let mut issues = Vec::new();
    for (name, value) in values {
        let Some(param) = report.parameter(&name) else {
            issues.push(ParameterIssue::UnknownParameter { name });
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if !param.is_restricted() {
            target.insert(param.name.clone(), value.to_string());
            continue;
        }
        let allowed = param
            .allowed_values
            .iter()
            .find(|allowed| *allowed == value)
            .or_else(|| {
                let folded: Vec<&String> = param
                    .allowed_values
                    .iter()
                    .filter(|allowed| allowed.eq_ignore_ascii_case(value))
                    .collect();
                match folded.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                }
            });
        match allowed {
            Some(allowed) => {
                target.insert(param.name.clone(), allowed.clone());
            }
            None => issues.push(ParameterIssue::DisallowedValue {
                name: param.name.clone(),
                value: value.to_string(),
                allowed: param.allowed_values.clone(),
            }),
        }
    }
    issues
}

fn issue_notes(issues: &[ParameterIssue]) -> Vec<String> {
    issues.iter().map(|issue| format!("Note: {issue}.")).collect()
}

fn parameter_prompt(report: &Report, values: &ParameterValues) -> String {
    let missing = missing_required(report, values);
    match missing.first() {
        Some(next) => {
            let mut prompt = ask_for(next);
            if missing.len() > 1 {
                prompt.push_str(&format!(" ({} required parameters left.)", missing.len()));
            }
            prompt
        }
        None => "All required parameters have values. Tell me any values you want to change, \
                 or say \"go\" to get the report link."
            .to_string(),
    }
}

fn ask_for(param: &ReportParameter) -> String {
    let mut prompt = format!("Please provide a value for **{}**", param.name);
    if param.label() != param.name {
        prompt.push_str(&format!(" ({})", param.label()));
    }
    if param.is_restricted() {
        prompt.push_str(&format!(". Allowed values: {}", param.allowed_values.join(", ")));
    }
    prompt.push('.');
    prompt
}

fn current_values(report: &Report, values: &ParameterValues) -> String {
    if report.parameters.is_empty() {
        return "none".to_string();
    }
    report
        .parameters
        .iter()
        .map(|param| match (lookup_value(values, &param.name), param.first_default()) {
            (Some(value), _) if !value.trim().is_empty() => format!("{}={value}", param.name),
            (_, Some(default)) => format!("{}={default} (default)", param.name),
            _ => format!("{} not set", param.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn candidate_list(candidates: &[Candidate]) -> String {
    let mut message = String::from("I found several reports that could match:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        message.push_str(&format!("{}. {} ({})\n", i + 1, candidate.name, candidate.path));
    }
    message.push_str("Reply with the number or the name of the report you want.");
    message
}

fn completed_reminder(url: &str) -> String {
    format!(
        "Your report link is:\n{url}\nSay \"start over\" to pick another report or \
         \"change parameters\" to adjust the values."
    )
}
