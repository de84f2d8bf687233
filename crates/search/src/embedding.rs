use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};

const AZURE_EMBEDDING_API_VERSION: &str = "2023-05-15";

/// Produces the query vector for nearest-neighbour search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            dimensions: default_dimensions(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    64
}

#[derive(Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
}

#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let backend = match config.provider.to_lowercase().as_str() {
            "openai" => EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::openai(&config.model)?),
            "azure" => {
                let endpoint = config
                    .endpoint
                    .clone()
                    .or_else(|| env::var("AZURE_OPENAI_ENDPOINT").ok())
                    .ok_or_else(|| anyhow!("azure embeddings need an endpoint"))?;
                EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::azure(&endpoint, &config.model)?)
            }
            "hash" => EmbeddingBackend::Hash(HashEmbedder::new(config.dimensions)),
            other => return Err(anyhow!(format!("unknown embedding provider {other}"))),
        };
        Ok(Self { backend })
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(default_dimensions())),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => Ok(embedder.embed_text(text)),
            EmbeddingBackend::OpenAi(client) => client.embed(text).await,
        }
    }
}

/// Deterministic bag-of-words hashing, for running without an embedding service.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    seed: u64,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            seed: 1337,
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            hasher.write_u64(self.seed);
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimensions] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    url: String,
    model: Option<String>,
    auth: EmbeddingAuth,
}

#[derive(Clone)]
enum EmbeddingAuth {
    Bearer(String),
    ApiKey(String),
}

impl OpenAiEmbeddingClient {
    pub fn openai(model: &str) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY is required for openai embeddings"))?;
        let base = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        Ok(Self {
            http: Client::new(),
            url: format!("{}/embeddings", base.trim_end_matches('/')),
            model: Some(model.to_string()),
            auth: EmbeddingAuth::Bearer(api_key),
        })
    }

    pub fn azure(endpoint: &str, deployment: &str) -> Result<Self> {
        let api_key = env::var("AZURE_OPENAI_API_KEY")
            .map_err(|_| anyhow!("AZURE_OPENAI_API_KEY is required for azure embeddings"))?;
        Ok(Self {
            http: Client::new(),
            url: format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                AZURE_EMBEDDING_API_VERSION
            ),
            model: None,
            auth: EmbeddingAuth::ApiKey(api_key),
        })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut payload = serde_json::json!({ "input": [text] });
        if let Some(model) = &self.model {
            payload["model"] = serde_json::json!(model);
        }
        let request = self.http.post(&self.url).json(&payload);
        let request = match &self.auth {
            EmbeddingAuth::Bearer(key) => request.bearer_auth(key),
            EmbeddingAuth::ApiKey(key) => request.header("api-key", key),
        };
        let response = request.send().await.context("embeddings request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "embeddings request failed: {}",
                response.status()
            ));
        }
        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .context("failed to decode embeddings response")?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| anyhow!("embeddings response was empty"))
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embeddings_are_normalised_and_stable() {
        let client = EmbeddingClient::hash();
        let a = client.embed("Monthly sales by region").await.unwrap();
        let b = client.embed("monthly SALES by region").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        assert!(EmbeddingClient::from_config(&config).is_err());
    }
}
