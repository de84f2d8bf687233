//! Conversation engine: resolves a reporting-server report from chat and
//! collects the parameters needed to render it.

mod chitchat;
mod error;
mod extraction;
mod intent;
mod matcher;
mod operations;
mod orchestrator;
mod session;
mod store;

pub use chitchat::{friendly_reply, is_chit_chat};
pub use error::{EngineError, Result};
pub use extraction::{extract_pairs, match_allowed_values, ParameterExtractor};
pub use matcher::ReportMatcher;
pub use operations::{EngineOperation, OperationOutcome};
pub use orchestrator::{ChatReply, ReportEngine, APOLOGY, BUSY};
pub use session::{Candidate, SessionContext, Stage};
pub use store::{InMemorySessionStore, SessionStore, StoreError};
