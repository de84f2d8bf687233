use std::fs;
use std::path::Path;

use async_trait::async_trait;
use reportfinder_core::{Report, ReportParameter};

use crate::error::Result;

/// Authoritative source of reports and their parameter definitions.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Every report, usually without parameter definitions filled in.
    async fn list_reports(&self) -> Result<Vec<Report>>;

    async fn report(&self, id: &str) -> Result<Option<Report>>;

    async fn parameter_definitions(&self, id: &str) -> Result<Vec<ReportParameter>>;
}

/// In-memory catalog, loaded from a JSON fixture for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    reports: Vec<Report>,
}

impl StaticCatalog {
    pub fn new(reports: Vec<Report>) -> Self {
        Self { reports }
    }

    /// Reads a JSON array of reports.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let reports: Vec<Report> = serde_json::from_str(raw)?;
        Ok(Self::new(reports))
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn list_reports(&self) -> Result<Vec<Report>> {
        Ok(self.reports.clone())
    }

    async fn report(&self, id: &str) -> Result<Option<Report>> {
        Ok(self.reports.iter().find(|report| report.id == id).cloned())
    }

    async fn parameter_definitions(&self, id: &str) -> Result<Vec<ReportParameter>> {
        Ok(self
            .reports
            .iter()
            .find(|report| report.id == id)
            .map(|report| report.parameters.clone())
            .unwrap_or_default())
    }
}
