use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("field mapping is missing mandatory field `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("search service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode search response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Rate limiting (429) and server errors (5xx) are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}
