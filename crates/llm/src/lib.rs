//! Completion-service clients behind one [`Completion`] seam.
//!
//! Hosted providers read their credentials from the environment; the
//! [`LlmProvider::Local`] provider answers offline so the engine runs
//! without any external service.

mod client;
mod local;
mod message;
mod provider;

pub use client::LlmClient;
pub use message::{ChatMessage, LlmRequest, LlmResponse, Role};
pub use provider::LlmProvider;

use anyhow::Result;
use async_trait::async_trait;

/// Anything that turns an instruction plus conversation into free text.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse>;
}
