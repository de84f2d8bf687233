use thiserror::Error;

use crate::validate::ParameterIssue;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid parameters: {}", join_issues(.0))]
    InvalidParameters(Vec<ParameterIssue>),
    #[error("report has no path: {0}")]
    MissingPath(String),
    #[error("viewer base url is empty")]
    MissingViewerUrl,
}

pub type Result<T> = std::result::Result<T, CoreError>;

fn join_issues(issues: &[ParameterIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
