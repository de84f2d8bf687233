use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("failed to decode catalog response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("failed to read catalog fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog fixture: {0}")]
    Fixture(#[from] serde_json::Error),
    #[error("catalog is not configured: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
