use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::BackendError;

const DEFAULT_API_VERSION: &str = "2023-11-01";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorQuery {
    pub field: String,
    pub vector: Vec<f32>,
    pub k: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub select: Vec<String>,
    pub semantic: bool,
    pub top: usize,
    pub vector: Option<VectorQuery>,
}

/// A sparse document keyed by physical index field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchHit {
    pub fields: Map<String, Value>,
}

impl SearchHit {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        }
    }

    /// Field value as text; non-string scalars are rendered, empties are `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        let text = match self.fields.get(field)? {
            Value::String(text) => text.trim().to_string(),
            Value::Null => return None,
            other => other.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzureSearchConfig {
    pub endpoint: String,
    pub index: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub semantic_configuration: Option<String>,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

/// Azure AI Search `docs/search` over REST.
#[derive(Clone)]
pub struct AzureSearchBackend {
    http: Client,
    config: AzureSearchConfig,
    api_key: String,
}

impl AzureSearchBackend {
    pub fn new(config: AzureSearchConfig, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            config,
            api_key: api_key.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index,
            self.config.api_version
        )
    }

    fn payload(&self, request: &SearchRequest) -> Value {
        let mut payload = json!({
            "search": request.query,
            "select": request.select.join(","),
            "top": request.top,
            "count": false,
        });
        if request.semantic {
            payload["queryType"] = json!("semantic");
            payload["semanticConfiguration"] = json!(self
                .config
                .semantic_configuration
                .as_deref()
                .unwrap_or("default"));
        }
        if let Some(vector) = &request.vector {
            payload["vectorQueries"] = json!([{
                "kind": "vector",
                "vector": vector.vector,
                "fields": vector.field,
                "k": vector.k,
            }]);
        }
        payload
    }
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
        let response = self
            .http
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&self.payload(request))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }
        let envelope: SearchEnvelope =
            serde_json::from_str(&body).map_err(|err| BackendError::Decode(err.to_string()))?;
        Ok(envelope
            .value
            .into_iter()
            .map(|doc| keep_selected(doc, &request.select))
            .collect())
    }
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

fn keep_selected(doc: Map<String, Value>, select: &[String]) -> SearchHit {
    SearchHit {
        fields: doc
            .into_iter()
            .filter(|(key, value)| !value.is_null() && select.iter().any(|field| field == key))
            .collect(),
    }
}
