use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use reportfinder_core::{Report, ReportParameter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};
use crate::source::CatalogSource;

/// Reporting-server REST API (`/api/v2.0`).
#[derive(Clone)]
pub struct SsrsRestSource {
    http: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl SsrsRestSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CatalogError::Config("catalog base_url is empty".into()));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            credentials: None,
        })
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    async fn get<T: DeserializeOwned>(&self, resource: &str) -> Result<Option<T>> {
        let url = self.url(resource);
        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.text().await?;
        debug!(%url, bytes = body.len(), "catalog response");
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|err| CatalogError::Decode {
                url,
                message: err.to_string(),
            })
    }
}

/// `Reports(<id>)` plus `suffix`; `None` for ids that are not plain
/// identifiers, which the server could read as a different resource.
fn report_resource(id: &str, suffix: &str) -> Option<String> {
    let id = id.trim();
    let plain = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if !plain {
        warn!(report_id = %id, "rejected malformed report id");
        return None;
    }
    Some(format!("Reports({id}){suffix}"))
}

#[async_trait]
impl CatalogSource for SsrsRestSource {
    async fn list_reports(&self) -> Result<Vec<Report>> {
        let envelope: Option<Envelope<ReportDto>> = self.get("Reports").await?;
        Ok(envelope
            .map(|envelope| envelope.items.into_iter().map(Report::from).collect())
            .unwrap_or_default())
    }

    async fn report(&self, id: &str) -> Result<Option<Report>> {
        let Some(resource) = report_resource(id, "") else {
            return Ok(None);
        };
        let dto: Option<ReportDto> = self.get(&resource).await?;
        Ok(dto.map(Report::from))
    }

    async fn parameter_definitions(&self, id: &str) -> Result<Vec<ReportParameter>> {
        let Some(resource) = report_resource(id, "/ParameterDefinitions") else {
            return Ok(Vec::new());
        };
        let envelope: Option<Envelope<ParameterDto>> = self.get(&resource).await?;
        Ok(envelope
            .map(|envelope| {
                envelope
                    .items
                    .into_iter()
                    .map(ReportParameter::from)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(alias = "value", default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportDto {
    id: String,
    name: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<ReportDto> for Report {
    fn from(dto: ReportDto) -> Self {
        let mut report = Report::new(dto.id, dto.name, dto.path);
        report.description = dto.description.filter(|d| !d.trim().is_empty());
        report
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterDto {
    name: String,
    #[serde(default)]
    parameter_type: Option<String>,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    allow_blank: bool,
    #[serde(default)]
    valid_values: Option<Vec<ValidValueDto>>,
    #[serde(default)]
    default_values: Option<Vec<String>>,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValidValueDto {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    value: String,
}

impl From<ParameterDto> for ReportParameter {
    fn from(dto: ParameterDto) -> Self {
        let mut param = ReportParameter::new(dto.name);
        if let Some(data_type) = dto.parameter_type.filter(|t| !t.trim().is_empty()) {
            param = param.typed(&data_type);
        }
        param.nullable = dto.nullable;
        param.allow_blank = dto.allow_blank;
        param.allowed_values = dto
            .valid_values
            .unwrap_or_default()
            .into_iter()
            .map(|valid| valid.value)
            .collect();
        param.default_values = dto.default_values.unwrap_or_default();
        param.prompt = dto.prompt.filter(|p| !p.trim().is_empty());
        param
    }
}
