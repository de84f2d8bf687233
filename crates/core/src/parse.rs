//! Defensive parsing of structured data out of free-text model replies.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

const WRAPPER_KEYS: [&str; 6] = ["parameters", "values", "extracted", "result", "data", "params"];

pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, raw: &str) -> Option<Value>;
}

/// Tries each strategy in order; the first that yields a value wins.
pub struct ParserChain {
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::new()
            .with(DirectJson)
            .with(FencedBlock)
            .with(BraceScan)
            .with(KeyValueLines)
    }
}

impl ParserChain {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: impl ParseStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn parse(&self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        for strategy in &self.strategies {
            if let Some(value) = strategy.parse(raw) {
                debug!(strategy = strategy.name(), "parsed model output");
                return Some(value);
            }
        }
        debug!(
            snippet = %raw.chars().take(120).collect::<String>(),
            "model output did not parse with any strategy"
        );
        None
    }

    /// Parses a flat name → value map, unwrapping `{"parameters": {...}}`-style
    /// envelopes and `[{"name": .., "value": ..}]` lists. Empty maps are `None`.
    pub fn parse_string_map(&self, raw: &str) -> Option<BTreeMap<String, String>> {
        let value = self.parse(raw)?;
        let map = string_map(unwrap_envelope(value))?;
        if map.is_empty() {
            None
        } else {
            Some(map)
        }
    }
}

pub struct DirectJson;

impl ParseStrategy for DirectJson {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        serde_json::from_str(raw).ok()
    }
}

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").expect("valid fence regex"));

pub struct FencedBlock;

impl ParseStrategy for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced"
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        let caps = FENCE.captures(raw)?;
        serde_json::from_str(&caps[1]).ok()
    }
}

/// Outermost `{...}` or `[...]` span embedded in prose.
pub struct BraceScan;

impl ParseStrategy for BraceScan {
    fn name(&self) -> &'static str {
        "brace_scan"
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        for (open, close) in [('{', '}'), ('[', ']')] {
            let (Some(start), Some(end)) = (raw.find(open), raw.rfind(close)) else {
                continue;
            };
            if start < end {
                if let Ok(value) = serde_json::from_str(&raw[start..=end]) {
                    return Some(value);
                }
            }
        }
        None
    }
}

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[\s\-\*•]*"?([A-Za-z_][\w ]{0,63}?)"?\s*[:=]\s*"?([^",{}]*?)"?\s*,?\s*$"#)
        .expect("valid key/value regex")
});

/// Permissive `Name: value` / `Name = value` line scan.
pub struct KeyValueLines;

impl ParseStrategy for KeyValueLines {
    fn name(&self) -> &'static str {
        "key_value_lines"
    }

    fn parse(&self, raw: &str) -> Option<Value> {
        let mut map = Map::new();
        for line in raw.lines() {
            if let Some(caps) = KEY_VALUE.captures(line) {
                let key = caps[1].trim();
                let value = caps[2].trim();
                if !key.is_empty() && !value.is_empty() {
                    map.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if map.len() == 1 {
                let key = map.keys().next().cloned().unwrap_or_default();
                if WRAPPER_KEYS.contains(&key.to_lowercase().as_str()) {
                    if let Some(inner) = map.remove(&key) {
                        return unwrap_envelope(inner);
                    }
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn string_map(value: Value) -> Option<BTreeMap<String, String>> {
    match value {
        Value::Object(map) => Some(
            map.into_iter()
                .filter_map(|(key, value)| scalar_text(&value).map(|text| (key, text)))
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name").and_then(Value::as_str)?;
                    let value = item.get("value").and_then(scalar_text)?;
                    Some((name.to_string(), value))
                })
                .collect(),
        ),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        _ => None,
    }
}
