pub mod backend;
pub mod client;
pub mod embedding;
pub mod error;
pub mod mapping;
pub mod retry;

pub use backend::{
    AzureSearchBackend, AzureSearchConfig, SearchBackend, SearchHit, SearchRequest, VectorQuery,
};
pub use client::{SearchClient, DEFAULT_TOP, NO_DOCUMENTATION};
pub use embedding::{Embedder, EmbeddingBackend, EmbeddingClient, EmbeddingConfig, HashEmbedder};
pub use error::{BackendError, SearchError};
pub use mapping::FieldMapping;
pub use retry::RetryPolicy;
