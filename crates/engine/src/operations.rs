use reportfinder_core::{
    validate_parameters, MatchMethod, NameResolver, ParameterIssue, ParameterValues, Report,
};
use reportfinder_search::SearchHit;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::orchestrator::ReportEngine;

/// The fixed set of operations any decision-maker may invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum EngineOperation {
    SearchReports {
        query: String,
    },
    ResolveReport {
        title: String,
    },
    ValidateParameters {
        report_id: String,
        #[serde(default)]
        values: ParameterValues,
    },
    BuildUrl {
        report_id: String,
        #[serde(default)]
        values: ParameterValues,
    },
    ExtractParameters {
        report_id: String,
        text: String,
    },
}

impl EngineOperation {
    pub fn name(&self) -> &'static str {
        match self {
            EngineOperation::SearchReports { .. } => "search_reports",
            EngineOperation::ResolveReport { .. } => "resolve_report",
            EngineOperation::ValidateParameters { .. } => "validate_parameters",
            EngineOperation::BuildUrl { .. } => "build_url",
            EngineOperation::ExtractParameters { .. } => "extract_parameters",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    Reports {
        hits: Vec<SearchHit>,
    },
    Resolved {
        report: Option<Report>,
        method: Option<MatchMethod>,
    },
    Validation {
        ok: bool,
        errors: Vec<ParameterIssue>,
    },
    Url {
        url: String,
    },
    Extracted {
        values: ParameterValues,
    },
}

impl ReportEngine {
    /// Runs one stateless operation; no session is read or written.
    pub async fn execute(&self, operation: EngineOperation) -> Result<OperationOutcome> {
        debug!(operation = operation.name(), "executing operation");
        match operation {
            EngineOperation::SearchReports { query } => Ok(OperationOutcome::Reports {
                hits: self.search.search_reports(&query).await,
            }),
            EngineOperation::ResolveReport { title } => self.resolve(&title).await,
            EngineOperation::ValidateParameters { report_id, values } => {
                let report = self.require_report(&report_id).await?;
                let validation = validate_parameters(&report, &values);
                Ok(OperationOutcome::Validation {
                    ok: validation.is_ok(),
                    errors: validation.errors,
                })
            }
            EngineOperation::BuildUrl { report_id, values } => {
                let report = self.require_report(&report_id).await?;
                let url = self.viewer.build(&report, &values)?;
                Ok(OperationOutcome::Url { url })
            }
            EngineOperation::ExtractParameters { report_id, text } => {
                let report = self.require_report(&report_id).await?;
                let values = self
                    .extractor
                    .extract(&report, &ParameterValues::new(), &text, None, &[])
                    .await;
                Ok(OperationOutcome::Extracted { values })
            }
        }
    }

    async fn resolve(&self, title: &str) -> Result<OperationOutcome> {
        let catalog = self.catalog.get_reports().await?;
        let resolved = match NameResolver::new(&catalog).resolve(title) {
            Some(found) => Some((found.report.clone(), found.method)),
            None => self
                .matcher
                .suggest(&catalog, title, &[])
                .await
                .map(|report| (report.clone(), MatchMethod::Suggested)),
        };
        Ok(match resolved {
            Some((mut report, method)) => {
                if report.parameters.is_empty() {
                    report.parameters = self.catalog.get_report_parameters(&report.id).await;
                }
                OperationOutcome::Resolved {
                    report: Some(report),
                    method: Some(method),
                }
            }
            None => OperationOutcome::Resolved {
                report: None,
                method: None,
            },
        })
    }

    async fn require_report(&self, report_id: &str) -> Result<Report> {
        self.catalog
            .get_report_by_id(report_id)
            .await
            .ok_or_else(|| EngineError::ReportNotFound(report_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_deserialize_from_tagged_json() {
        let op: EngineOperation = serde_json::from_str(
            r#"{"operation":"build_url","report_id":"R1","values":{"Region":"North"}}"#,
        )
        .unwrap();
        assert_eq!(op.name(), "build_url");
        let op: EngineOperation =
            serde_json::from_str(r#"{"operation":"validate_parameters","report_id":"R1"}"#).unwrap();
        assert!(matches!(op, EngineOperation::ValidateParameters { values, .. } if values.is_empty()));
    }

    #[test]
    fn outcomes_serialize_with_a_tag() {
        let json = serde_json::to_value(OperationOutcome::Url { url: "u".into() }).unwrap();
        assert_eq!(json["outcome"], "url");
        assert_eq!(json["url"], "u");
    }
}
