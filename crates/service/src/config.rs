use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use reportfinder_catalog::CatalogConfig;
use reportfinder_search::{EmbeddingConfig, FieldMapping, DEFAULT_TOP};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "reportfinder.toml";

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub viewer: ViewerSettings,
    #[serde(default)]
    pub sessions: SessionSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

/// `[search]`; without an endpoint the catalog itself is searched.
#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub semantic_configuration: Option<String>,
    #[serde(default)]
    pub vector_search: bool,
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default = "default_fields")]
    pub fields: FieldMapping,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            index: None,
            api_version: None,
            semantic_configuration: None,
            vector_search: false,
            top: default_top(),
            fields: default_fields(),
        }
    }
}

fn default_top() -> usize {
    DEFAULT_TOP
}

fn default_fields() -> FieldMapping {
    FieldMapping {
        id: "id".into(),
        title: "title".into(),
        content: "content".into(),
        url: None,
        file_path: None,
        metadata: None,
        vector: None,
        parent_id: None,
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewerSettings {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub format_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    /// Sessions idle longer than this are dropped; unset keeps them forever.
    #[serde(default)]
    pub idle_timeout_minutes: Option<u64>,
    #[serde(default = "default_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: None,
            sweep_interval_secs: default_sweep_secs(),
        }
    }
}

fn default_sweep_secs() -> u64 {
    300
}

/// Missing file means defaults; a present but invalid one is an error.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let mut config: AppConfig =
        toml::from_str(contents).map_err(|e| anyhow!("invalid config: {e}"))?;
    config.search.fields = config
        .search
        .fields
        .clone()
        .validated()
        .context("invalid [search.fields]")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses() {
        let config = parse_config(include_str!("../../../reportfinder.toml")).unwrap();
        assert_eq!(config.llm.provider, "local");
        assert_eq!(config.search.fields.title, "title");
        assert!(config.catalog.fixture.is_some());
        assert!(config.viewer.base_url.starts_with("https://"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.search.top, DEFAULT_TOP);
        assert!(config.sessions.idle_timeout_minutes.is_none());
    }

    #[test]
    fn blank_mandatory_field_is_rejected() {
        let err = parse_config(
            r#"
            [search.fields]
            id = "id"
            title = ""
            content = "chunk"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("title"));
    }

    #[test]
    fn empty_optional_fields_are_dropped() {
        let config = parse_config(
            r#"
            [search.fields]
            id = "chunk_id"
            title = "title"
            content = "chunk"
            vector = ""
            filepath = "path"
            "#,
        )
        .unwrap();
        assert!(config.search.fields.vector.is_none());
        assert_eq!(config.search.fields.file_path.as_deref(), Some("path"));
    }
}
