use serde::{Deserialize, Serialize};

/// A report as published by the reporting server's catalog.
///
/// `id` is the only stable identity; names may repeat and rarely agree with
/// the titles used in documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ReportParameter>,
}

impl Report {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            description: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<ReportParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Case-insensitive lookup; callers emit `ReportParameter::name` to keep catalog casing.
    pub fn parameter(&self, name: &str) -> Option<&ReportParameter> {
        let wanted = name.trim();
        self.parameters
            .iter()
            .find(|param| param.name == wanted)
            .or_else(|| {
                self.parameters
                    .iter()
                    .find(|param| param.name.eq_ignore_ascii_case(wanted))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportParameter {
    pub name: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub allow_blank: bool,
    #[serde(default)]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub default_values: Vec<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_data_type() -> String {
    "String".to_string()
}

impl ReportParameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: default_data_type(),
            nullable: false,
            allow_blank: false,
            allowed_values: Vec::new(),
            default_values: Vec::new(),
            prompt: None,
        }
    }

    pub fn typed(mut self, data_type: &str) -> Self {
        self.data_type = data_type.to_string();
        self
    }

    pub fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn defaults(mut self, values: &[&str]) -> Self {
        self.default_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn is_required(&self) -> bool {
        !self.nullable && !self.allow_blank
    }

    pub fn first_default(&self) -> Option<&str> {
        self.default_values.first().map(String::as_str)
    }

    pub fn has_default(&self) -> bool {
        !self.default_values.is_empty()
    }

    pub fn is_restricted(&self) -> bool {
        !self.allowed_values.is_empty()
    }

    /// Required, no server default, and nothing usable supplied.
    pub fn is_missing(&self, supplied: Option<&str>) -> bool {
        self.is_required() && !self.has_default() && supplied.map_or(true, |v| v.trim().is_empty())
    }

    pub fn label(&self) -> &str {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_is_derived_from_nullable_and_blank() {
        assert!(ReportParameter::new("Region").is_required());
        assert!(!ReportParameter::new("Region").optional().is_required());
        let mut blank = ReportParameter::new("Note");
        blank.allow_blank = true;
        assert!(!blank.is_required());
    }

    #[test]
    fn parameter_with_default_is_never_missing() {
        let param = ReportParameter::new("Format").defaults(&["PDF"]);
        assert!(!param.is_missing(None));
        assert!(!param.is_missing(Some("")));
        let bare = ReportParameter::new("Region");
        assert!(bare.is_missing(None));
        assert!(bare.is_missing(Some("  ")));
        assert!(!bare.is_missing(Some("North")));
    }

    #[test]
    fn parameter_lookup_prefers_exact_casing() {
        let report = Report::new("R1", "Sales", "/Sales").with_parameters(vec![
            ReportParameter::new("region"),
            ReportParameter::new("Region"),
        ]);
        assert_eq!(report.parameter("Region").unwrap().name, "Region");
        assert_eq!(report.parameter("REGION").unwrap().name, "region");
        assert!(report.parameter("Year").is_none());
    }
}
