//! Core listing model shared by the filter engine and its data-access collaborators.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "hirescope-core";

/// Inclusive integer range, used both for listing attributes and criteria bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub min: i64,
    pub max: i64,
}

impl Bounds {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    /// True when `inner` lies entirely within `self`.
    pub fn contains_range(&self, inner: &Bounds) -> bool {
        inner.min >= self.min && inner.max <= self.max
    }
}

/// Listing record as fetched by the data-access layer. Immutable once loaded.
///
/// Only `id` is mandatory on the wire. Every other attribute may be absent and
/// is then treated as failing any non-vacuous predicate that inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_range: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_job_types",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Listing {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            location_name: None,
            destination_range: None,
            category: None,
            job_types: None,
            created_at: None,
            experience_level: None,
            salary_range: None,
            tag: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_name = Some(location.into());
        self
    }

    pub fn with_destination(mut self, min: i64, max: i64) -> Self {
        self.destination_range = Some(Bounds::new(min, max));
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_job_types<I, S>(mut self, job_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.job_types = Some(job_types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    pub fn with_experience_level(mut self, level: impl Into<String>) -> Self {
        self.experience_level = Some(level.into());
        self
    }

    pub fn with_salary(mut self, min: i64, max: i64) -> Self {
        self.salary_range = Some(Bounds::new(min, max));
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Job types in facet-token form. Empty when the listing carries none.
    pub fn normalized_job_types(&self) -> Vec<String> {
        self.job_types
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|t| normalize_token(t))
            .collect()
    }

    pub fn normalized_experience_level(&self) -> Option<String> {
        self.experience_level.as_deref().map(normalize_token)
    }

    pub fn normalized_created_at(&self) -> Option<String> {
        self.created_at.as_deref().map(normalize_token)
    }
}

/// The listing collection could not be loaded. Distinct from "zero matches".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listing data unavailable: {reason}")]
pub struct DataUnavailableError {
    pub reason: String,
}

impl DataUnavailableError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Facet token form: lowercased, spaces replaced with hyphens.
pub fn normalize_token(input: &str) -> String {
    input.to_lowercase().replace(' ', "-")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

// Upstream feeds send either a single job type string or a list of them.
fn deserialize_job_types<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(raw.map(|v| match v {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(items) => items,
    }))
}
