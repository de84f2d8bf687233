use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::session::SessionContext;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("session {session_id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        session_id: String,
        expected: u64,
        found: u64,
    },
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed session persistence with optimistic versioning.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the session, creating it when unseen. `None` generates a fresh id.
    async fn get_or_create(&self, session_id: Option<&str>) -> Result<SessionContext, StoreError>;

    /// Stores `session` if its version still matches; returns it with the version bumped.
    async fn save(&self, session: SessionContext) -> Result<SessionContext, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionContext>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drops sessions untouched for longer than `max_idle`; returns how many went.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at >= cutoff);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, session_id: Option<&str>) -> Result<SessionContext, StoreError> {
        let id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Some(session) = self.sessions.read().get(&id) {
            return Ok(session.clone());
        }
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(session_id = %id, "created session");
                SessionContext::new(id)
            })
            .clone();
        Ok(session)
    }

    async fn save(&self, mut session: SessionContext) -> Result<SessionContext, StoreError> {
        let mut sessions = self.sessions.write();
        if let Some(current) = sessions.get(&session.session_id) {
            if current.version != session.version {
                return Err(StoreError::Conflict {
                    session_id: session.session_id.clone(),
                    expected: session.version,
                    found: current.version,
                });
            }
        }
        session.version += 1;
        session.updated_at = Utc::now();
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }
}
