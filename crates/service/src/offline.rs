use async_trait::async_trait;
use reportfinder_core::{token_overlap_score, Report};
use reportfinder_search::{BackendError, FieldMapping, SearchBackend, SearchHit, SearchRequest};
use serde_json::{Map, Value};

/// Searches report names and descriptions in memory when no index is configured.
pub struct CatalogIndexBackend {
    documents: Vec<IndexedReport>,
}

struct IndexedReport {
    text: String,
    hit: SearchHit,
}

impl CatalogIndexBackend {
    pub fn new(reports: &[Report], mapping: &FieldMapping) -> Self {
        let documents = reports
            .iter()
            .map(|report| {
                let content = report.description.clone().unwrap_or_default();
                let mut fields = Map::new();
                fields.insert(mapping.id.clone(), Value::String(report.id.clone()));
                fields.insert(mapping.title.clone(), Value::String(report.name.clone()));
                fields.insert(mapping.content.clone(), Value::String(content.clone()));
                if let Some(path_field) = &mapping.file_path {
                    fields.insert(path_field.clone(), Value::String(report.path.clone()));
                }
                IndexedReport {
                    text: format!("{} {content}", report.name),
                    hit: SearchHit { fields },
                }
            })
            .collect();
        Self { documents }
    }
}

#[async_trait]
impl SearchBackend for CatalogIndexBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
        let mut scored: Vec<(f32, &IndexedReport)> = self
            .documents
            .iter()
            .map(|doc| (token_overlap_score(&request.query, &doc.text), doc))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let best = scored.first().map_or(0.0, |(score, _)| *score);
        Ok(scored
            .into_iter()
            .take_while(|(score, _)| *score >= best / 2.0)
            .take(request.top)
            .map(|(_, doc)| doc.hit.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.into(),
            select: vec![],
            semantic: true,
            top: 20,
            vector: None,
        }
    }

    fn backend() -> CatalogIndexBackend {
        let mut stock = Report::new("R2", "Inventory Status", "/Ops/Inventory");
        stock.description = Some("Stock levels per warehouse".into());
        let mapping = FieldMapping::new("id", "title", "content").unwrap();
        CatalogIndexBackend::new(
            &[Report::new("R1", "RegionalSalesMonthly", "/Finance/Regional"), stock],
            &mapping,
        )
    }

    #[tokio::test]
    async fn best_matches_come_first() {
        let hits = backend().search(&request("monthly sales by region")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text("id").as_deref(), Some("R1"));

        let hits = backend().search(&request("warehouse stock")).await.unwrap();
        assert_eq!(hits[0].text("title").as_deref(), Some("Inventory Status"));
    }

    #[tokio::test]
    async fn unrelated_queries_find_nothing() {
        assert!(backend().search(&request("payroll")).await.unwrap().is_empty());
    }
}
