mod error;
mod model;
mod parse;
mod resolver;
mod validate;
mod viewer;

pub use error::{CoreError, Result};
pub use model::{Report, ReportParameter};
pub use parse::{BraceScan, DirectJson, FencedBlock, KeyValueLines, ParseStrategy, ParserChain};
pub use resolver::{
    clean_suggestion, token_overlap_score, tokenize, MatchMethod, NameResolver, Resolution,
    NO_MATCH,
};
pub use validate::{
    lookup_value, missing_required, validate_parameters, ParameterIssue, ParameterValues,
    ValidationReport,
};
pub use viewer::{normalize_path, ViewerUrlBuilder, DEFAULT_FORMAT_MARKER, RENDER_COMMAND};
