use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use reportfinder_core::{Report, ReportParameter};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};
use crate::rest::SsrsRestSource;
use crate::source::{CatalogSource, StaticCatalog};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// REST root, e.g. `https://host/reports/api/v2.0`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// JSON fixture used instead of a live server.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

impl CatalogConfig {
    /// A fixture wins over a live server. The password comes from `CATALOG_PASSWORD`.
    pub fn build_source(&self) -> Result<Arc<dyn CatalogSource>> {
        if let Some(path) = &self.fixture {
            return Ok(Arc::new(StaticCatalog::from_json_file(path)?));
        }
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| CatalogError::Config("set catalog.base_url or catalog.fixture".into()))?;
        let mut source = SsrsRestSource::new(base_url)?;
        if let Some(user) = self.username.as_deref().filter(|u| !u.is_empty()) {
            let password = env::var("CATALOG_PASSWORD").unwrap_or_default();
            source = source.with_basic_auth(user, password);
        }
        Ok(Arc::new(source))
    }
}

/// Lookups the conversation relies on. Only [`ReportCatalog::get_reports`]
/// reports failures; the targeted lookups degrade to `None` or empty.
#[derive(Clone)]
pub struct ReportCatalog {
    source: Arc<dyn CatalogSource>,
}

impl ReportCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    pub async fn get_reports(&self) -> Result<Vec<Report>> {
        self.source.list_reports().await
    }

    pub async fn get_report_by_id(&self, id: &str) -> Option<Report> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        match self.source.report(id).await {
            Ok(Some(report)) => Some(self.with_parameters(report).await),
            Ok(None) => None,
            Err(err) => {
                warn!(report_id = id, error = %err, "report lookup failed");
                None
            }
        }
    }

    pub async fn get_report_parameters(&self, id: &str) -> Vec<ReportParameter> {
        match self.source.parameter_definitions(id).await {
            Ok(params) => params,
            Err(err) => {
                warn!(report_id = id, error = %err, "parameter lookup failed");
                Vec::new()
            }
        }
    }

    /// Exact case-insensitive name, else the first substring match either way.
    pub async fn get_report_by_name(&self, name: &str) -> Option<Report> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        let reports = match self.source.list_reports().await {
            Ok(reports) => reports,
            Err(err) => {
                warn!(name, error = %err, "catalog listing failed");
                return None;
            }
        };
        let found = reports
            .iter()
            .position(|report| report.name.trim().to_lowercase() == wanted)
            .or_else(|| {
                reports.iter().position(|report| {
                    let candidate = report.name.trim().to_lowercase();
                    !candidate.is_empty()
                        && (candidate.contains(&wanted) || wanted.contains(&candidate))
                })
            })?;
        let report = reports.into_iter().nth(found)?;
        debug!(name, report_id = %report.id, "report matched by name");
        Some(self.with_parameters(report).await)
    }

    async fn with_parameters(&self, mut report: Report) -> Report {
        if report.parameters.is_empty() {
            report.parameters = self.get_report_parameters(&report.id).await;
        }
        report
    }
}
