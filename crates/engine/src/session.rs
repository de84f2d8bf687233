use std::fmt;

use chrono::{DateTime, Utc};
use reportfinder_core::{ParameterValues, Report};
use reportfinder_llm::ChatMessage;
use serde::{Deserialize, Serialize};

/// Conversation stage. Moves forward only, except the resets out of `Completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    ReportSelection,
    ParameterFilling,
    ReportUrlCreation,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ReportSelection => "ReportSelection",
            Stage::ParameterFilling => "ParameterFilling",
            Stage::ReportUrlCreation => "ReportUrlCreation",
            Stage::Completed => "Completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A report offered in a numbered list, awaiting the user's pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub path: String,
}

impl From<&Report> for Candidate {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            name: report.name.clone(),
            path: report.path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub history: Vec<ChatMessage>,
    pub stage: Stage,
    pub selected_report: Option<Report>,
    pub parameters: ParameterValues,
    pub report_url: Option<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Bumped by the store on every save.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            history: Vec::new(),
            stage: Stage::ReportSelection,
            selected_report: None,
            parameters: ParameterValues::new(),
            report_url: None,
            candidates: Vec::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn record_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    pub fn record_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content));
    }

    /// The last `n` turns, oldest first.
    pub fn recent_history(&self, n: usize) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Selects `report`, discarding anything collected for a previous one.
    pub fn select_report(&mut self, report: Report) {
        self.selected_report = Some(report);
        self.parameters.clear();
        self.report_url = None;
        self.candidates.clear();
        self.stage = Stage::ParameterFilling;
    }

    /// Back to an empty `ReportSelection`; history is kept.
    pub fn reset(&mut self) {
        self.selected_report = None;
        self.parameters.clear();
        self.report_url = None;
        self.candidates.clear();
        self.stage = Stage::ReportSelection;
    }

    /// Repairs stage/report combinations that must never be observed.
    /// Returns `true` when something was changed.
    pub fn repair(&mut self) -> bool {
        if self.stage != Stage::ReportSelection && self.selected_report.is_none() {
            self.reset();
            return true;
        }
        if self.stage == Stage::Completed && self.report_url.is_none() {
            self.stage = Stage::ReportUrlCreation;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_clears_previous_progress() {
        let mut session = SessionContext::new("s1");
        session.parameters.insert("Region".into(), "North".into());
        session.report_url = Some("https://x".into());
        session.select_report(Report::new("R1", "Sales", "/Sales"));
        assert_eq!(session.stage, Stage::ParameterFilling);
        assert!(session.parameters.is_empty());
        assert!(session.report_url.is_none());
    }

    #[test]
    fn repair_never_leaves_a_stage_without_its_report() {
        let mut session = SessionContext::new("s1");
        session.stage = Stage::Completed;
        assert!(session.repair());
        assert_eq!(session.stage, Stage::ReportSelection);

        session.select_report(Report::new("R1", "Sales", "/Sales"));
        session.stage = Stage::Completed;
        assert!(session.repair());
        assert_eq!(session.stage, Stage::ReportUrlCreation);
        assert!(!session.repair());
    }

    #[test]
    fn recent_history_is_a_suffix() {
        let mut session = SessionContext::new("s1");
        for i in 0..5 {
            session.record_user(format!("turn {i}"));
        }
        let recent = session.recent_history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, "turn 4");
        assert_eq!(session.recent_history(10).len(), 5);
    }
}
