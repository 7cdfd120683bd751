use std::path::PathBuf;

use thiserror::Error;

use crate::facets::FacetKind;

/// A criteria mutation was rejected. The criteria keep their previous value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: min {min} exceeds max {max}")]
    InvertedRange {
        field: &'static str,
        min: i64,
        max: i64,
    },
    #[error("unknown criteria field '{0}'")]
    UnknownField(String),
    #[error("{field}: '{value}' is not a valid {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },
    #[error("'{0}' is not a set-valued field")]
    NotASetField(String),
    #[error("no {kind} facet value with id {id}")]
    UnknownFacetValue { kind: FacetKind, id: u32 },
}

#[derive(Debug, Error)]
pub enum FacetConfigError {
    #[error("reading facet config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing facet config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{kind} facet declares value '{value}' more than once")]
    DuplicateValue { kind: FacetKind, value: String },
    #[error("{kind} facet has a value with an empty name")]
    EmptyValue { kind: FacetKind },
}
