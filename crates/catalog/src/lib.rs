mod catalog;
mod error;
mod rest;
mod source;

pub use catalog::{CatalogConfig, ReportCatalog};
pub use error::{CatalogError, Result};
pub use rest::SsrsRestSource;
pub use source::{CatalogSource, StaticCatalog};
