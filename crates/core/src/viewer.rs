use url::form_urlencoded::byte_serialize;

use crate::error::{CoreError, Result};
use crate::model::Report;
use crate::validate::{lookup_value, validate_parameters, ParameterValues};

pub const RENDER_COMMAND: &str = "rs:Command=Render";
pub const DEFAULT_FORMAT_MARKER: &str = "rs:Format=HTML5";

/// Builds report-server URL-access links: `{base}?{path}&rs:Command=Render&...&{format}`.
#[derive(Debug, Clone)]
pub struct ViewerUrlBuilder {
    base_url: String,
    format_marker: String,
}

impl ViewerUrlBuilder {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('?').to_string();
        if base_url.is_empty() {
            return Err(CoreError::MissingViewerUrl);
        }
        Ok(Self {
            base_url,
            format_marker: DEFAULT_FORMAT_MARKER.to_string(),
        })
    }

    pub fn with_format_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let marker = marker.trim().trim_start_matches('&');
        if !marker.is_empty() {
            self.format_marker = marker.to_string();
        }
        self
    }

    /// Validates `values` and renders the viewer link.
    ///
    /// Parameters are emitted in catalog order with catalog casing. A value equal
    /// to the first server default is left out, as is a defaulted parameter with
    /// no value; an undefaulted parameter with no value is sent empty.
    pub fn build(&self, report: &Report, values: &ParameterValues) -> Result<String> {
        let validation = validate_parameters(report, values);
        if !validation.is_ok() {
            return Err(CoreError::InvalidParameters(validation.errors));
        }
        let path = normalize_path(&report.path);
        if path == "/" {
            return Err(CoreError::MissingPath(report.id.clone()));
        }
        let mut query = format!("&{RENDER_COMMAND}");
        for param in &report.parameters {
            let supplied = lookup_value(values, &param.name).filter(|v| !v.trim().is_empty());
            let emitted = match (supplied, param.first_default()) {
                (Some(value), Some(default)) if value == default => None,
                (Some(value), _) => Some(value),
                (None, Some(_)) => None,
                (None, None) => Some(""),
            };
            if let Some(value) = emitted {
                query.push('&');
                query.push_str(&encode(&param.name));
                query.push('=');
                query.push_str(&encode(value));
            }
        }
        query.push('&');
        query.push_str(&self.format_marker);
        Ok(format!("{}?{}{}", self.base_url, encode_path(&path), query))
    }
}

pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn encode(text: &str) -> String {
    byte_serialize(text.as_bytes()).collect()
}

fn encode_path(path: &str) -> String {
    path.split('/').map(encode).collect::<Vec<_>>().join("/")
}
