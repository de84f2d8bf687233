use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Report;

/// Parameter values keyed by name, as collected from the conversation.
pub type ParameterValues = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterIssue {
    MissingRequired { name: String },
    UnknownParameter { name: String },
    DisallowedValue {
        name: String,
        value: String,
        allowed: Vec<String>,
    },
}

impl ParameterIssue {
    pub fn parameter(&self) -> &str {
        match self {
            ParameterIssue::MissingRequired { name }
            | ParameterIssue::UnknownParameter { name }
            | ParameterIssue::DisallowedValue { name, .. } => name,
        }
    }
}

impl fmt::Display for ParameterIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterIssue::MissingRequired { name } => {
                write!(f, "required parameter missing: {name}")
            }
            ParameterIssue::UnknownParameter { name } => write!(f, "unknown parameter: {name}"),
            ParameterIssue::DisallowedValue {
                name,
                value,
                allowed,
            } => write!(
                f,
                "value '{value}' is not allowed for {name}; allowed values: {}",
                allowed.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ParameterIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks `values` against the report's declared parameters.
///
/// Produces exactly one issue per missing required parameter, one per
/// unrecognised key and one per value outside a restricted list. Names match
/// case-insensitively; allowed values match exactly.
pub fn validate_parameters(report: &Report, values: &ParameterValues) -> ValidationReport {
    let mut errors = Vec::new();
    for param in &report.parameters {
        let supplied = lookup_value(values, &param.name);
        if param.is_missing(supplied) {
            errors.push(ParameterIssue::MissingRequired {
                name: param.name.clone(),
            });
        }
    }
    for (key, value) in values {
        let Some(param) = report.parameter(key) else {
            errors.push(ParameterIssue::UnknownParameter { name: key.clone() });
            continue;
        };
        if value.trim().is_empty() || !param.is_restricted() {
            continue;
        }
        if !param.allowed_values.iter().any(|allowed| allowed == value) {
            errors.push(ParameterIssue::DisallowedValue {
                name: param.name.clone(),
                value: value.clone(),
                allowed: param.allowed_values.clone(),
            });
        }
    }
    ValidationReport { errors }
}

/// Required parameters still lacking a usable value, in catalog order.
pub fn missing_required<'a>(
    report: &'a Report,
    values: &ParameterValues,
) -> Vec<&'a crate::model::ReportParameter> {
    report
        .parameters
        .iter()
        .filter(|param| param.is_missing(lookup_value(values, &param.name)))
        .collect()
}

/// Value supplied for `name`, preferring an exact key over a case-insensitive one.
pub fn lookup_value<'a>(values: &'a ParameterValues, name: &str) -> Option<&'a str> {
    values
        .get(name)
        .or_else(|| {
            values
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}
