use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reportfinder_catalog::ReportCatalog;
use reportfinder_core::ViewerUrlBuilder;
use reportfinder_engine::{InMemorySessionStore, ReportEngine};
use reportfinder_llm::{Completion, LlmClient, LlmProvider};
use reportfinder_search::{
    AzureSearchBackend, AzureSearchConfig, EmbeddingClient, SearchBackend, SearchClient,
};
use tracing::info;

use crate::config::{AppConfig, LlmSettings, SearchSettings};
use crate::offline::CatalogIndexBackend;

/// The engine plus the concrete store, kept for idle eviction.
pub struct Runtime {
    pub engine: Arc<ReportEngine>,
    pub sessions: Arc<InMemorySessionStore>,
}

pub async fn build(config: &AppConfig) -> Result<Runtime> {
    let catalog = ReportCatalog::new(
        config
            .catalog
            .build_source()
            .context("failed to set up the report catalog")?,
    );
    let search = build_search(&config.search, config, &catalog).await?;
    let llm = build_llm(&config.llm)?;
    let mut viewer = ViewerUrlBuilder::new(config.viewer.base_url.clone())
        .context("set [viewer] base_url")?;
    if let Some(marker) = &config.viewer.format_marker {
        viewer = viewer.with_format_marker(marker.clone());
    }
    let sessions = Arc::new(InMemorySessionStore::new());
    let engine = ReportEngine::new(catalog, search, llm, viewer).with_store(sessions.clone());
    Ok(Runtime {
        engine: Arc::new(engine),
        sessions,
    })
}

async fn build_search(
    settings: &SearchSettings,
    config: &AppConfig,
    catalog: &ReportCatalog,
) -> Result<SearchClient> {
    let backend: Arc<dyn SearchBackend> = match &settings.endpoint {
        Some(endpoint) => {
            let index = settings
                .index
                .clone()
                .ok_or_else(|| anyhow!("[search] endpoint is set but index is missing"))?;
            let api_key = env::var("SEARCH_API_KEY")
                .map_err(|_| anyhow!("SEARCH_API_KEY is required when [search] endpoint is set"))?;
            let azure = AzureSearchConfig {
                endpoint: endpoint.clone(),
                index,
                api_version: settings
                    .api_version
                    .clone()
                    .unwrap_or_else(|| "2023-11-01".to_string()),
                semantic_configuration: settings.semantic_configuration.clone(),
            };
            info!(endpoint = %endpoint, index = %azure.index, "using search index");
            Arc::new(AzureSearchBackend::new(azure, api_key))
        }
        None => {
            let reports = catalog
                .get_reports()
                .await
                .context("failed to load the catalog for offline search")?;
            info!(reports = reports.len(), "no search endpoint configured, searching the catalog");
            Arc::new(CatalogIndexBackend::new(&reports, &settings.fields))
        }
    };
    let mut client = SearchClient::new(backend, settings.fields.clone()).with_top(settings.top);
    if settings.vector_search {
        if settings.fields.vector.is_none() {
            return Err(anyhow!("vector_search needs [search.fields] vector"));
        }
        let embedder = EmbeddingClient::from_config(&config.embedding)?;
        client = client.with_embedder(Arc::new(embedder));
    }
    Ok(client)
}

fn build_llm(settings: &LlmSettings) -> Result<Arc<dyn Completion>> {
    let provider = LlmProvider::from_str(&settings.provider)
        .ok_or_else(|| anyhow!(format!("unknown llm provider {}", settings.provider)))?;
    let model = settings
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());
    info!(provider = provider.as_str(), model = %model, "completion client ready");
    Ok(Arc::new(LlmClient::new(provider, model)?))
}
