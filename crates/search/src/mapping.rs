use serde::{Deserialize, Serialize};

use crate::backend::SearchHit;
use crate::error::SearchError;

/// Binds the logical document fields to the physical names of one index.
///
/// `id`, `title` and `content` must be non-empty. Optional fields left out
/// (or set to an empty string) are never requested from the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "filepath")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub vector: Option<String>,
    #[serde(default, alias = "parent")]
    pub parent_id: Option<String>,
}

impl FieldMapping {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, SearchError> {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            url: None,
            file_path: None,
            metadata: None,
            vector: None,
            parent_id: None,
        }
        .validated()
    }

    /// Fails on an empty mandatory field and normalises empty optionals to `None`.
    pub fn validated(mut self) -> Result<Self, SearchError> {
        for (label, value) in [
            ("id", &self.id),
            ("title", &self.title),
            ("content", &self.content),
        ] {
            if value.trim().is_empty() {
                return Err(SearchError::MissingField(label));
            }
        }
        for slot in [
            &mut self.url,
            &mut self.file_path,
            &mut self.metadata,
            &mut self.vector,
            &mut self.parent_id,
        ] {
            if slot.as_deref().map_or(false, |v| v.trim().is_empty()) {
                *slot = None;
            }
        }
        Ok(self)
    }

    pub fn with_url(mut self, field: impl Into<String>) -> Self {
        self.url = non_empty(field.into());
        self
    }

    pub fn with_vector(mut self, field: impl Into<String>) -> Self {
        self.vector = non_empty(field.into());
        self
    }

    pub fn with_parent_id(mut self, field: impl Into<String>) -> Self {
        self.parent_id = non_empty(field.into());
        self
    }

    /// Physical fields placed in the select list; the vector field is never selected.
    pub fn selected_fields(&self) -> Vec<String> {
        let mut fields = vec![self.id.clone(), self.title.clone(), self.content.clone()];
        for optional in [&self.url, &self.file_path, &self.metadata, &self.parent_id] {
            if let Some(field) = optional {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        fields
    }

    pub fn title_of(&self, hit: &SearchHit) -> Option<String> {
        hit.text(&self.title)
    }

    pub fn content_of(&self, hit: &SearchHit) -> Option<String> {
        hit.text(&self.content)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
