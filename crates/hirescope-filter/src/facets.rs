//! Facet value store and the toggle synchronizer.
//!
//! Selection flags on [`FacetValue`] are a projection of [`FilterCriteria`].
//! They can only be written by [`FacetStore::reconcile`], which the session
//! calls after every criteria mutation.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use hirescope_core::normalize_token;
use serde::{Deserialize, Serialize};

use crate::criteria::FilterCriteria;
use crate::error::{FacetConfigError, ValidationError};

/// Facet groups that carry selectable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacetKind {
    JobTypes,
    DatePosted,
    ExperienceLevels,
    Tag,
}

impl FacetKind {
    pub const ALL: [FacetKind; 4] = [
        FacetKind::JobTypes,
        FacetKind::DatePosted,
        FacetKind::ExperienceLevels,
        FacetKind::Tag,
    ];

    pub fn selection(self) -> Selection {
        match self {
            FacetKind::JobTypes | FacetKind::ExperienceLevels => Selection::Multi,
            FacetKind::DatePosted | FacetKind::Tag => Selection::Single,
        }
    }

    /// Form in which values of this kind are stored and compared.
    /// Tags match listings exactly; the other kinds use the token form.
    pub fn canonical_value(self, raw: &str) -> String {
        match self {
            FacetKind::Tag => raw.to_string(),
            _ => normalize_token(raw.trim()),
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FacetKind::JobTypes => "jobTypes",
            FacetKind::DatePosted => "datePosted",
            FacetKind::ExperienceLevels => "experienceLevels",
            FacetKind::Tag => "tag",
        })
    }
}

impl FromStr for FacetKind {
    type Err = ValidationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "jobTypes" | "job_types" => Ok(Self::JobTypes),
            "datePosted" | "date_posted" => Ok(Self::DatePosted),
            "experienceLevels" | "experience_levels" => Ok(Self::ExperienceLevels),
            "tag" | "tags" => Ok(Self::Tag),
            other => Err(ValidationError::UnknownField(other.to_string())),
        }
    }
}

/// Checkbox (multi) or radio (single) group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    Single,
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetValue {
    pub id: u32,
    pub name: String,
    pub value: String,
    is_selected: bool,
}

impl FacetValue {
    pub fn is_selected(&self) -> bool {
        self.is_selected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetGroup {
    kind: FacetKind,
    selection: Selection,
    values: Vec<FacetValue>,
}

impl FacetGroup {
    pub fn kind(&self) -> FacetKind {
        self.kind
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn values(&self) -> &[FacetValue] {
        &self.values
    }

    pub fn find(&self, id: u32) -> Option<&FacetValue> {
        self.values.iter().find(|v| v.id == id)
    }

    pub fn selected_values(&self) -> impl Iterator<Item = &FacetValue> {
        self.values.iter().filter(|v| v.is_selected)
    }
}

/// Static facet configuration, typically read from `facets.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetConfig {
    #[serde(default)]
    pub groups: Vec<FacetGroupConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacetGroupConfig {
    pub kind: FacetKind,
    #[serde(default)]
    pub values: Vec<FacetValueConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacetValueConfig {
    pub name: String,
    /// Defaults to `name` when omitted.
    #[serde(default)]
    pub value: Option<String>,
}

const BUILTIN_FACETS: &[(FacetKind, &[&str])] = &[
    (
        FacetKind::JobTypes,
        &["Full Time", "Part Time", "Remote Jobs", "Freelancer", "Internship"],
    ),
    (
        FacetKind::DatePosted,
        &["All", "Last Hour", "Last 24 Hours", "Last 7 Days", "Last 14 Days", "Last 30 Days"],
    ),
    (
        FacetKind::ExperienceLevels,
        &["Internship", "Entry Level", "Associate", "Mid Level", "Director", "Executive"],
    ),
    (
        FacetKind::Tag,
        &["Remote", "Urgent", "Featured", "Visa Sponsorship"],
    ),
];

impl FacetConfig {
    pub fn builtin() -> Self {
        Self {
            groups: BUILTIN_FACETS
                .iter()
                .map(|(kind, names)| FacetGroupConfig {
                    kind: *kind,
                    values: names
                        .iter()
                        .map(|name| FacetValueConfig {
                            name: (*name).to_string(),
                            value: None,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, FacetConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FacetConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| FacetConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }
}

/// Master list of selectable values per facet group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FacetStore {
    groups: Vec<FacetGroup>,
}

impl Default for FacetStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FacetStore {
    pub fn builtin() -> Self {
        match Self::from_config(FacetConfig::builtin()) {
            Ok(store) => store,
            // Builtin values are distinct and non-empty.
            Err(_) => Self::empty(),
        }
    }

    pub fn empty() -> Self {
        Self {
            groups: FacetKind::ALL
                .iter()
                .map(|kind| FacetGroup {
                    kind: *kind,
                    selection: kind.selection(),
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Build every group from configuration. Kinds missing from the config
    /// get an empty group; a kind listed twice has its values appended.
    pub fn from_config(config: FacetConfig) -> Result<Self, FacetConfigError> {
        let mut store = Self::empty();
        for group_config in config.groups {
            let kind = group_config.kind;
            let Some(group) = store.groups.iter_mut().find(|g| g.kind == kind) else {
                continue;
            };
            let mut seen = group
                .values
                .iter()
                .map(|v| v.value.clone())
                .collect::<HashSet<_>>();
            for value_config in group_config.values {
                let name = value_config.name.trim().to_string();
                if name.is_empty() {
                    return Err(FacetConfigError::EmptyValue { kind });
                }
                let value = kind.canonical_value(value_config.value.as_deref().unwrap_or(&name));
                if value.is_empty() {
                    return Err(FacetConfigError::EmptyValue { kind });
                }
                if !seen.insert(value.clone()) {
                    return Err(FacetConfigError::DuplicateValue { kind, value });
                }
                let id = group.values.len() as u32 + 1;
                group.values.push(FacetValue {
                    id,
                    name,
                    value,
                    is_selected: false,
                });
            }
        }
        Ok(store)
    }

    pub fn groups(&self) -> &[FacetGroup] {
        &self.groups
    }

    pub fn group(&self, kind: FacetKind) -> Option<&FacetGroup> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    /// Project criteria onto every selection flag.
    pub(crate) fn reconcile(&mut self, criteria: &FilterCriteria) {
        for kind in FacetKind::ALL {
            self.reconcile_kind(kind, criteria);
        }
    }

    pub(crate) fn reconcile_kind(&mut self, kind: FacetKind, criteria: &FilterCriteria) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.kind == kind) {
            for value in &mut group.values {
                value.is_selected = criteria.is_selected(kind, &value.value);
            }
        }
    }

    /// True when every flag equals its criteria membership.
    pub fn is_consistent_with(&self, criteria: &FilterCriteria) -> bool {
        self.groups.iter().all(|group| {
            group
                .values
                .iter()
                .all(|v| v.is_selected == criteria.is_selected(group.kind, &v.value))
        })
    }

    pub fn any_selected(&self) -> bool {
        self.groups.iter().any(|g| g.selected_values().next().is_some())
    }
}
