use std::env;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::local;
use crate::message::{LlmRequest, LlmResponse, Role};
use crate::provider::LlmProvider;
use crate::Completion;

const MAX_ATTEMPTS: u32 = 4;
const AZURE_API_VERSION: &str = "2024-02-15-preview";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Chat completion over the configured provider.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    target: Target,
}

/// Where requests go and how they authenticate.
#[derive(Clone)]
enum Target {
    OpenAi { base_url: String, api_key: String },
    Azure { endpoint: String, api_key: String },
    Anthropic { api_key: String, max_tokens: u32 },
    Local,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let api_key = match provider.key_var() {
            Some(var) => api_key_from_env(var)?,
            None => String::new(),
        };
        let target = match provider {
            LlmProvider::OpenAi => Target::OpenAi {
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_BASE.to_string()),
                api_key,
            },
            LlmProvider::AzureOpenAi => Target::Azure {
                endpoint: env::var("AZURE_OPENAI_ENDPOINT")
                    .context("AZURE_OPENAI_ENDPOINT is not set")?,
                api_key,
            },
            LlmProvider::Anthropic => Target::Anthropic {
                api_key,
                max_tokens: env::var("ANTHROPIC_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(512),
            },
            LlmProvider::Local => Target::Local,
        };
        Ok(Self {
            http: Client::new(),
            provider,
            model: model.into(),
            target,
        })
    }

    pub fn local() -> Self {
        Self {
            http: Client::new(),
            provider: LlmProvider::Local,
            model: LlmProvider::Local.default_model().to_string(),
            target: Target::Local,
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        match &self.target {
            Target::OpenAi { base_url, api_key } => {
                let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
                let body = ChatCompletionBody::new(Some(self.model.as_str()), req);
                let reply: ChatCompletionReply = self
                    .send(|| self.http.post(&url).bearer_auth(api_key).json(&body))
                    .await?;
                reply.into_response()
            }
            Target::Azure { endpoint, api_key } => {
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={AZURE_API_VERSION}",
                    endpoint.trim_end_matches('/'),
                    self.model,
                );
                let body = ChatCompletionBody::new(None, req);
                let reply: ChatCompletionReply = self
                    .send(|| self.http.post(&url).header("api-key", api_key).json(&body))
                    .await?;
                reply.into_response()
            }
            Target::Anthropic {
                api_key,
                max_tokens,
            } => {
                let body = MessagesBody {
                    model: &self.model,
                    max_tokens: *max_tokens,
                    system: req.system.as_deref(),
                    messages: wire_messages(req, false),
                };
                let reply: MessagesReply = self
                    .send(|| {
                        self.http
                            .post(ANTHROPIC_URL)
                            .header("x-api-key", api_key)
                            .header("anthropic-version", ANTHROPIC_VERSION)
                            .json(&body)
                    })
                    .await?;
                reply.into_response()
            }
            Target::Local => Ok(local::respond(req)),
        }
    }

    /// Sends the request built by `build`, retrying rate limits, server errors
    /// and transport failures with exponential backoff.
    async fn send<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let label = self.provider.as_str();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = match build().send().await {
                Ok(response) => response,
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let wait = backoff(attempt, None);
                    warn!(provider = label, attempt, error = %err, "completion request failed, retrying");
                    sleep(wait).await;
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("{label} request failed"));
                }
            };
            let status = response.status();
            if is_retryable(status) && attempt < MAX_ATTEMPTS {
                let wait = backoff(attempt, response.headers().get("retry-after"));
                warn!(provider = label, %status, attempt, wait_secs = wait.as_secs(), "retrying completion");
                sleep(wait).await;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                bail!("{label} returned {status}: {body}");
            }
            debug!(provider = label, attempt, bytes = body.len(), "completion received");
            return serde_json::from_str(&body)
                .with_context(|| format!("failed to decode {label} response"));
        }
    }
}

#[async_trait]
impl Completion for LlmClient {
    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse> {
        self.chat(req).await
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `Retry-After` seconds when present, otherwise 2^attempt seconds capped at 64.
fn backoff(attempt: u32, retry_after: Option<&HeaderValue>) -> Duration {
    let hinted = retry_after
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.trim().parse::<u64>().ok());
    match hinted {
        Some(secs) => Duration::from_secs(secs.max(1)),
        None => Duration::from_secs(1u64 << attempt.min(6)),
    }
}

fn api_key_from_env(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!("{var} is not set"))?;
    let value = value.trim().to_string();
    if value.is_empty() {
        bail!("{var} is empty");
    }
    Ok(value)
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// History in provider shape; `with_system` prepends the instruction as a turn.
fn wire_messages(req: &LlmRequest, with_system: bool) -> Vec<WireMessage<'_>> {
    let system = req
        .system
        .as_deref()
        .filter(|_| with_system)
        .map(|content| WireMessage {
            role: "system",
            content,
        });
    system
        .into_iter()
        .chain(req.messages.iter().map(|m| WireMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        }))
        .collect()
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

impl<'a> ChatCompletionBody<'a> {
    fn new(model: Option<&'a str>, req: &'a LlmRequest) -> Self {
        Self {
            model,
            messages: wire_messages(req, true),
            temperature: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatCompletionReply {
    fn into_response(self) -> Result<LlmResponse> {
        let content = self
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("completion returned no text"))?;
        let (prompt_tokens, completion_tokens) = self
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));
        Ok(LlmResponse {
            content,
            prompt_tokens,
            completion_tokens,
        })
    }
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesReply {
    fn into_response(self) -> Result<LlmResponse> {
        let content = self
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| anyhow!("messages reply carried no text block"))?;
        let (prompt_tokens, completion_tokens) = self
            .usage
            .map_or((0, 0), |u| (u.input_tokens, u.output_tokens));
        Ok(LlmResponse {
            content,
            prompt_tokens,
            completion_tokens,
        })
    }
}
