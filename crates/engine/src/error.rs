use reportfinder_catalog::CatalogError;
use reportfinder_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("report not found: {0}")]
    ReportNotFound(String),
    #[error("no report is selected")]
    NoReportSelected,
}

pub type Result<T> = std::result::Result<T, EngineError>;
