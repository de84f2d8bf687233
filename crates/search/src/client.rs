use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{SearchBackend, SearchHit, SearchRequest, VectorQuery};
use crate::embedding::Embedder;
use crate::mapping::FieldMapping;
use crate::retry::RetryPolicy;

pub const DEFAULT_TOP: usize = 20;
pub const NO_DOCUMENTATION: &str = "No documentation available.";

/// Best-effort report search over a field-mapped index. Never fails: every
/// error degrades to an empty result or the documentation sentinel.
#[derive(Clone)]
pub struct SearchClient {
    backend: Arc<dyn SearchBackend>,
    embedder: Option<Arc<dyn Embedder>>,
    mapping: FieldMapping,
    retry: RetryPolicy,
    top: usize,
}

impl SearchClient {
    pub fn new(backend: Arc<dyn SearchBackend>, mapping: FieldMapping) -> Self {
        Self {
            backend,
            embedder: None,
            mapping,
            retry: RetryPolicy::default(),
            top: DEFAULT_TOP,
        }
    }

    /// Enables vector search; ignored unless the mapping names a vector field.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top.clamp(1, DEFAULT_TOP);
        self
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub async fn search_reports(&self, query: &str) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let vector = self.vector_query(query).await;
        self.execute(query, vector).await
    }

    /// Concatenated content of every hit for `title`, or [`NO_DOCUMENTATION`].
    pub async fn get_documentation(&self, title: &str) -> String {
        let title = title.trim();
        if title.is_empty() {
            return NO_DOCUMENTATION.to_string();
        }
        let sections: Vec<String> = self
            .execute(title, None)
            .await
            .iter()
            .filter_map(|hit| self.mapping.content_of(hit))
            .collect();
        if sections.is_empty() {
            NO_DOCUMENTATION.to_string()
        } else {
            sections.join("\n\n")
        }
    }

    async fn vector_query(&self, query: &str) -> Option<VectorQuery> {
        let field = self.mapping.vector.clone()?;
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(query).await {
            Ok(vector) if !vector.is_empty() => Some(VectorQuery {
                field,
                vector,
                k: self.top,
            }),
            Ok(_) => {
                warn!("embedding was empty, falling back to keyword search");
                None
            }
            Err(err) => {
                warn!(error = %err, "embedding failed, falling back to keyword search");
                None
            }
        }
    }

    async fn execute(&self, query: &str, vector: Option<VectorQuery>) -> Vec<SearchHit> {
        let request = SearchRequest {
            query: query.to_string(),
            select: self.mapping.selected_fields(),
            semantic: true,
            top: self.top,
            vector,
        };
        match self.retry.run(|| self.backend.search(&request)).await {
            Ok(mut hits) => {
                hits.truncate(self.top);
                debug!(query, hits = hits.len(), "search completed");
                hits
            }
            Err(err) => {
                warn!(query, error = %err, "search failed, returning no results");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::{Duration, Instant};

    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<Vec<SearchHit>, BackendError>>>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl ScriptedBackend {
        fn with(replies: Vec<Result<Vec<SearchHit>, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct FixedEmbedder(Option<Vec<f32>>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            self.0.clone().ok_or_else(|| anyhow!("embedding service down"))
        }
    }

    fn mapping() -> FieldMapping {
        FieldMapping::new("id", "title", "content")
            .unwrap()
            .with_vector("contentVector")
    }

    fn unavailable() -> BackendError {
        BackendError::Status {
            status: 503,
            message: "unavailable".into(),
        }
    }

    fn hit(title: &str, content: &str) -> SearchHit {
        SearchHit::from_pairs(&[("id", title), ("title", title), ("content", content)])
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_three_transient_failures() {
        let backend = ScriptedBackend::with(vec![
            Err(unavailable()),
            Err(unavailable()),
            Err(unavailable()),
            Ok(vec![hit("Sales", "monthly sales")]),
        ]);
        let client = SearchClient::new(backend.clone(), mapping());
        let started = Instant::now();
        let hits = client.search_reports("sales").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(backend.calls(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(14) && elapsed < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_degrade_to_empty() {
        let backend = ScriptedBackend::with((0..4).map(|_| Err(unavailable())).collect());
        let client = SearchClient::new(backend.clone(), mapping());
        assert!(client.search_reports("sales").await.is_empty());
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn vector_query_attached_when_embedding_succeeds() {
        let backend = ScriptedBackend::with(vec![Ok(vec![])]);
        let client = SearchClient::new(backend.clone(), mapping())
            .with_embedder(Arc::new(FixedEmbedder(Some(vec![0.1, 0.2]))));
        client.search_reports("inventory").await;
        let requests = backend.requests.lock().unwrap();
        let vector = requests[0].vector.as_ref().unwrap();
        assert_eq!(vector.field, "contentVector");
        assert_eq!(vector.k, DEFAULT_TOP);
        assert!(requests[0].semantic);
        assert!(!requests[0].select.contains(&"contentVector".to_string()));
    }

    #[tokio::test]
    async fn embedding_failure_falls_back_to_keyword_search() {
        let backend = ScriptedBackend::with(vec![Ok(vec![hit("Inventory", "stock")])]);
        let client = SearchClient::new(backend.clone(), mapping())
            .with_embedder(Arc::new(FixedEmbedder(None)));
        assert_eq!(client.search_reports("inventory").await.len(), 1);
        assert!(backend.requests.lock().unwrap()[0].vector.is_none());
    }

    #[tokio::test]
    async fn results_are_capped() {
        let many = (0..30).map(|i| hit(&format!("R{i}"), "x")).collect();
        let client = SearchClient::new(ScriptedBackend::with(vec![Ok(many)]), mapping());
        assert_eq!(client.search_reports("r").await.len(), DEFAULT_TOP);
    }

    #[tokio::test]
    async fn documentation_concatenates_content() {
        let backend = ScriptedBackend::with(vec![Ok(vec![
            hit("Sales", "Part one."),
            SearchHit::from_pairs(&[("id", "2"), ("title", "Sales")]),
            hit("Sales", "Part two."),
        ])]);
        let client = SearchClient::new(backend, mapping());
        assert_eq!(client.get_documentation("Sales").await, "Part one.\n\nPart two.");
    }

    #[tokio::test]
    async fn documentation_sentinel_when_nothing_found() {
        let backend = ScriptedBackend::with(vec![Err(BackendError::Status {
            status: 403,
            message: "forbidden".into(),
        })]);
        let client = SearchClient::new(backend.clone(), mapping());
        assert_eq!(client.get_documentation("Sales").await, NO_DOCUMENTATION);
        assert_eq!(backend.calls(), 1);
        let empty = SearchClient::new(ScriptedBackend::with(vec![]), mapping());
        assert_eq!(empty.get_documentation("Sales").await, NO_DOCUMENTATION);
    }
}
