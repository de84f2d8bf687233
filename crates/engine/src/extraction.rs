use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use reportfinder_core::{lookup_value, ParameterValues, ParserChain, Report, ReportParameter};
use reportfinder_llm::{ChatMessage, Completion, LlmRequest};
use tracing::{debug, warn};

use crate::intent::{wants_change, wants_reset};

static KEY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*[:=]\s*").expect("valid key pattern"));

const MAX_BARE_ANSWER_WORDS: usize = 6;
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Pulls parameter values out of free text: explicit `Name=Value` pairs
/// first, then allowed values, then the model, then a typed bare answer to
/// the prompted parameter.
#[derive(Clone)]
pub struct ParameterExtractor {
    llm: Arc<dyn Completion>,
    parser: Arc<ParserChain>,
}

impl ParameterExtractor {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self {
            llm,
            parser: Arc::new(ParserChain::default()),
        }
    }

    /// Values keyed by catalog parameter name. Unknown names never appear.
    pub async fn extract(
        &self,
        report: &Report,
        current: &ParameterValues,
        text: &str,
        prompted: Option<&ReportParameter>,
        history: &[ChatMessage],
    ) -> ParameterValues {
        let text = text.trim();
        if text.is_empty() {
            return ParameterValues::new();
        }
        let explicit = extract_pairs(report, text);
        if !explicit.is_empty() {
            debug!(count = explicit.len(), "parameters extracted from explicit pairs");
            return explicit;
        }
        let bare = match_allowed_values(report, current, text);
        if !bare.is_empty() {
            debug!(count = bare.len(), "parameters extracted from allowed values");
            return bare;
        }
        let modelled = self.extract_with_model(report, text, history).await;
        if !modelled.is_empty() {
            debug!(count = modelled.len(), "parameters extracted by model");
            return modelled;
        }
        prompted
            .and_then(|param| bare_answer(param, text))
            .into_iter()
            .collect()
    }

    async fn extract_with_model(
        &self,
        report: &Report,
        text: &str,
        history: &[ChatMessage],
    ) -> ParameterValues {
        if report.parameters.is_empty() {
            return ParameterValues::new();
        }
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(text));
        let request = LlmRequest {
            system: Some(extraction_prompt(report)),
            messages,
        };
        let reply = match self.llm.complete(&request).await {
            Ok(reply) => reply.content,
            Err(err) => {
                warn!(report_id = %report.id, error = %err, "parameter extraction call failed");
                return ParameterValues::new();
            }
        };
        let Some(raw) = self.parser.parse_string_map(&reply) else {
            debug!(report_id = %report.id, "model reply held no parameter values");
            return ParameterValues::new();
        };
        raw.into_iter()
            .filter_map(|(key, value)| {
                let param = report.parameter(&key)?;
                let value = value.trim();
                (!value.is_empty()).then(|| (param.name.clone(), value.to_string()))
            })
            .collect()
    }
}

fn extraction_prompt(report: &Report) -> String {
    let mut prompt = format!(
        "You extract report parameter values from the user's messages for the report \"{}\".\n\
         Parameters:\n",
        report.name
    );
    for param in &report.parameters {
        prompt.push_str(&format!("- {} ({})", param.name, param.data_type));
        if let Some(label) = param.prompt.as_deref().filter(|p| *p != param.name) {
            prompt.push_str(&format!(": {label}"));
        }
        if param.is_restricted() {
            prompt.push_str(&format!(" [allowed: {}]", param.allowed_values.join(", ")));
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "Reply with a single JSON object mapping parameter names to the values the user stated. \
         Leave out anything the user did not say. Reply {} when there is nothing to extract.",
    );
    prompt
}

/// `Name=Value` and `Name: Value` pairs for known parameters.
pub fn extract_pairs(report: &Report, text: &str) -> ParameterValues {
    let markers: Vec<(usize, usize, &ReportParameter)> = KEY_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let param = report.parameter(caps.get(1)?.as_str())?;
            Some((whole.start(), whole.end(), param))
        })
        .collect();
    let mut values = ParameterValues::new();
    for (i, (_, value_start, param)) in markers.iter().enumerate() {
        let value_end = markers.get(i + 1).map_or(text.len(), |next| next.0);
        let value = clean_value(&text[*value_start..value_end]);
        if !value.is_empty() {
            values.insert(param.name.clone(), value);
        }
    }
    values
}

fn clean_value(raw: &str) -> String {
    let mut value = raw.split([',', ';', '\n']).next().unwrap_or("").trim();
    loop {
        if let Some(stripped) = strip_suffix_ignore_case(value, " and") {
            value = stripped.trim_end();
        } else if let Some(stripped) = value.strip_suffix('&') {
            value = stripped.trim_end();
        } else {
            break;
        }
    }
    value
        .trim_end_matches('.')
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim()
        .to_string()
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = value.len().checked_sub(suffix.len())?;
    value
        .get(cut..)?
        .eq_ignore_ascii_case(suffix)
        .then(|| &value[..cut])
}

/// Allowed values mentioned on their own, when each one points at a single
/// unfilled parameter. Emits the catalog spelling of the value.
pub fn match_allowed_values(report: &Report, current: &ParameterValues, text: &str) -> ParameterValues {
    let open: Vec<&ReportParameter> = report
        .parameters
        .iter()
        .filter(|param| param.is_restricted())
        .filter(|param| lookup_value(current, &param.name).map_or(true, |v| v.trim().is_empty()))
        .collect();
    let mut found: Vec<(&ReportParameter, &str)> = Vec::new();
    for param in &open {
        let hits: Vec<&str> = param
            .allowed_values
            .iter()
            .map(String::as_str)
            .filter(|value| mentions(text, value))
            .collect();
        if let [only] = hits.as_slice() {
            found.push((*param, *only));
        }
    }
    found
        .iter()
        .filter(|(param, value)| {
            !open.iter().any(|other| {
                other.name != param.name
                    && other
                        .allowed_values
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(value))
            })
        })
        .map(|(param, value)| (param.name.clone(), value.to_string()))
        .collect()
}

fn mentions(text: &str, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    Regex::new(&format!(r"(?i)(?:^|\W){}(?:$|\W)", regex::escape(value)))
        .map(|pattern| pattern.is_match(text))
        .unwrap_or(false)
}

/// A short reply taken as the value of the parameter the user was asked for.
/// Only an allowed value or text that parses as the parameter's declared type
/// qualifies. String parameters take a single token; longer phrases need an
/// explicit pair.
fn bare_answer(param: &ReportParameter, text: &str) -> Option<(String, String)> {
    if text.contains('?')
        || text.split_whitespace().count() > MAX_BARE_ANSWER_WORDS
        || wants_reset(text)
        || wants_change(text)
    {
        return None;
    }
    let value = clean_value(text);
    if value.is_empty() {
        return None;
    }
    if param.is_restricted() {
        return param
            .allowed_values
            .iter()
            .find(|allowed| allowed.eq_ignore_ascii_case(&value))
            .map(|allowed| (param.name.clone(), allowed.clone()));
    }
    let accepted = match param.data_type.trim().to_ascii_lowercase().as_str() {
        "string" | "text" | "" => !text.trim().contains(char::is_whitespace),
        other => parses_as(other, &value),
    };
    accepted.then(|| (param.name.clone(), value))
}

fn parses_as(data_type: &str, value: &str) -> bool {
    match data_type {
        "integer" | "int" | "int32" | "int64" => value.parse::<i64>().is_ok(),
        "float" | "double" | "decimal" => value.parse::<f64>().is_ok(),
        "boolean" | "bool" => matches!(value.to_ascii_lowercase().as_str(), "true" | "false"),
        "datetime" | "date" => DATE_FORMATS
            .iter()
            .any(|format| NaiveDate::parse_from_str(value, format).is_ok())
            || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok(),
        _ => false,
    }
}
