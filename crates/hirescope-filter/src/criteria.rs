//! Canonical filter criteria state.
//!
//! `FilterCriteria` is the single source of truth for every facet. Range
//! invariants are checked at the mutation boundary, so the evaluator never
//! sees an inverted range.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use hirescope_core::Bounds;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::facets::FacetKind;

pub const DEFAULT_DESTINATION: Bounds = Bounds::new(0, 100);
pub const DEFAULT_SALARY: Bounds = Bounds::new(0, 20_000);
/// Date-posted sentinel that disables the facet, same as the empty string.
pub const DATE_POSTED_ANY: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    None,
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "asc" | "ascending" | "oldest" => Ok(Self::Ascending),
            "des" | "desc" | "descending" | "newest" => Ok(Self::Descending),
            _ => Err(ValidationError::InvalidValue {
                field: "sort".into(),
                value: value.to_string(),
                expected: "sort order",
            }),
        }
    }
}

/// Result window. `limit == 0` means "everything from `offset` on".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

impl PageWindow {
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Criteria fields that hold a set of values and accept checkbox toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetField {
    JobTypes,
    ExperienceLevels,
}

impl SetField {
    pub fn facet_kind(self) -> FacetKind {
        match self {
            SetField::JobTypes => FacetKind::JobTypes,
            SetField::ExperienceLevels => FacetKind::ExperienceLevels,
        }
    }
}

impl FromStr for SetField {
    type Err = ValidationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "jobTypes" | "job_types" | "jobType" | "job_type" => Ok(Self::JobTypes),
            "experienceLevels" | "experience_levels" | "experienceLevel" | "experience_level" => {
                Ok(Self::ExperienceLevels)
            }
            other => Err(ValidationError::NotASetField(other.to_string())),
        }
    }
}

impl fmt::Display for SetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.facet_kind(), f)
    }
}

/// One field-level mutation of [`FilterCriteria`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaUpdate {
    Keyword(String),
    Location(String),
    Destination(Bounds),
    DestinationMin(i64),
    DestinationMax(i64),
    Category(String),
    JobTypes(BTreeSet<String>),
    DatePosted(String),
    ExperienceLevels(BTreeSet<String>),
    Salary(Bounds),
    SalaryMin(i64),
    SalaryMax(i64),
    Tag(String),
    Sort(SortOrder),
    Page(PageWindow),
    Offset(usize),
    Limit(usize),
}

impl CriteriaUpdate {
    /// Parse a name-keyed update as it arrives from a query string or form.
    /// Set-valued fields take a comma-separated list.
    pub fn parse(name: &str, raw: &str) -> Result<Self, ValidationError> {
        let update = match name {
            "keyword" | "q" => Self::Keyword(raw.to_string()),
            "location" => Self::Location(raw.to_string()),
            "destinationMin" | "destination_min" => Self::DestinationMin(parse_int(name, raw)?),
            "destinationMax" | "destination_max" => Self::DestinationMax(parse_int(name, raw)?),
            "category" => Self::Category(raw.to_string()),
            "jobTypes" | "job_types" => Self::JobTypes(split_list(raw)),
            "datePosted" | "date_posted" => Self::DatePosted(raw.to_string()),
            "experienceLevels" | "experience_levels" => Self::ExperienceLevels(split_list(raw)),
            "salaryMin" | "salary_min" => Self::SalaryMin(parse_int(name, raw)?),
            "salaryMax" | "salary_max" => Self::SalaryMax(parse_int(name, raw)?),
            "tag" => Self::Tag(raw.to_string()),
            "sort" => Self::Sort(raw.parse()?),
            "offset" => Self::Offset(parse_count(name, raw)?),
            "limit" => Self::Limit(parse_count(name, raw)?),
            other => return Err(ValidationError::UnknownField(other.to_string())),
        };
        Ok(update)
    }

    /// Facet group whose selection flags depend on this field, if any.
    pub fn facet_kind(&self) -> Option<FacetKind> {
        match self {
            Self::JobTypes(_) => Some(FacetKind::JobTypes),
            Self::DatePosted(_) => Some(FacetKind::DatePosted),
            Self::ExperienceLevels(_) => Some(FacetKind::ExperienceLevels),
            Self::Tag(_) => Some(FacetKind::Tag),
            _ => None,
        }
    }
}

fn parse_int(field: &str, raw: &str) -> Result<i64, ValidationError> {
    raw.trim().parse().map_err(|_| ValidationError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        expected: "integer",
    })
}

fn parse_count(field: &str, raw: &str) -> Result<usize, ValidationError> {
    raw.trim().parse().map_err(|_| ValidationError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        expected: "non-negative integer",
    })
}

fn split_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Canonical facet-keyed predicate state for one view or request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    keyword: String,
    location: String,
    destination: Bounds,
    category: String,
    job_types: BTreeSet<String>,
    date_posted: String,
    experience_levels: BTreeSet<String>,
    salary: Bounds,
    tag: String,
    sort: SortOrder,
    page: PageWindow,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            location: String::new(),
            destination: DEFAULT_DESTINATION,
            category: String::new(),
            job_types: BTreeSet::new(),
            date_posted: String::new(),
            experience_levels: BTreeSet::new(),
            salary: DEFAULT_SALARY,
            tag: String::new(),
            sort: SortOrder::None,
            page: PageWindow::default(),
        }
    }
}

impl FilterCriteria {
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn destination(&self) -> Bounds {
        self.destination
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn job_types(&self) -> &BTreeSet<String> {
        &self.job_types
    }

    pub fn date_posted(&self) -> &str {
        &self.date_posted
    }

    pub fn experience_levels(&self) -> &BTreeSet<String> {
        &self.experience_levels
    }

    pub fn salary(&self) -> Bounds {
        self.salary
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn page(&self) -> PageWindow {
        self.page
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Apply one field update. On error nothing changes.
    pub fn set_field(&mut self, update: CriteriaUpdate) -> Result<(), ValidationError> {
        debug!(?update, "criteria set_field");
        match update {
            CriteriaUpdate::Keyword(v) => self.keyword = v,
            CriteriaUpdate::Location(v) => self.location = v,
            CriteriaUpdate::Destination(b) => self.destination = checked("destination", b)?,
            CriteriaUpdate::DestinationMin(min) => {
                self.destination = checked("destination", Bounds::new(min, self.destination.max))?
            }
            CriteriaUpdate::DestinationMax(max) => {
                self.destination = checked("destination", Bounds::new(self.destination.min, max))?
            }
            CriteriaUpdate::Category(v) => self.category = v,
            CriteriaUpdate::JobTypes(values) => {
                self.job_types = canonical_set(FacetKind::JobTypes, values)
            }
            CriteriaUpdate::DatePosted(v) => {
                self.date_posted = FacetKind::DatePosted.canonical_value(&v)
            }
            CriteriaUpdate::ExperienceLevels(values) => {
                self.experience_levels = canonical_set(FacetKind::ExperienceLevels, values)
            }
            CriteriaUpdate::Salary(b) => self.salary = checked("salary", b)?,
            CriteriaUpdate::SalaryMin(min) => {
                self.salary = checked("salary", Bounds::new(min, self.salary.max))?
            }
            CriteriaUpdate::SalaryMax(max) => {
                self.salary = checked("salary", Bounds::new(self.salary.min, max))?
            }
            CriteriaUpdate::Tag(v) => self.tag = v,
            CriteriaUpdate::Sort(order) => self.sort = order,
            CriteriaUpdate::Page(window) => self.page = window,
            CriteriaUpdate::Offset(offset) => self.page.offset = offset,
            CriteriaUpdate::Limit(limit) => self.page.limit = limit,
        }
        Ok(())
    }

    /// Parse and apply a name-keyed update.
    pub fn set_field_by_name(&mut self, name: &str, raw: &str) -> Result<(), ValidationError> {
        self.set_field(CriteriaUpdate::parse(name, raw)?)
    }

    /// Checkbox semantics: add `value` if absent, remove it if present.
    /// Returns whether the value is a member afterwards.
    pub fn toggle_set_member(&mut self, field: SetField, value: &str) -> Result<bool, ValidationError> {
        let kind = field.facet_kind();
        let value = kind.canonical_value(value);
        if value.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: field.to_string(),
                value,
                expected: "non-empty facet value",
            });
        }
        let set = match field {
            SetField::JobTypes => &mut self.job_types,
            SetField::ExperienceLevels => &mut self.experience_levels,
        };
        let now_member = if set.remove(&value) {
            false
        } else {
            set.insert(value.clone());
            true
        };
        debug!(%field, %value, now_member, "criteria toggle");
        Ok(now_member)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether `value` (already in canonical form) is selected for `kind`.
    pub fn is_selected(&self, kind: FacetKind, value: &str) -> bool {
        match kind {
            FacetKind::JobTypes => self.job_types.contains(value),
            FacetKind::DatePosted => self.date_posted == value,
            FacetKind::ExperienceLevels => self.experience_levels.contains(value),
            FacetKind::Tag => self.tag == value,
        }
    }

    /// Copy of these criteria with `kind` narrowed to exactly `value`.
    pub(crate) fn with_only_selection(&self, kind: FacetKind, value: &str) -> Self {
        let mut next = self.clone();
        match kind {
            FacetKind::JobTypes => next.job_types = BTreeSet::from([value.to_string()]),
            FacetKind::DatePosted => next.date_posted = value.to_string(),
            FacetKind::ExperienceLevels => {
                next.experience_levels = BTreeSet::from([value.to_string()])
            }
            FacetKind::Tag => next.tag = value.to_string(),
        }
        next
    }
}

fn checked(field: &'static str, bounds: Bounds) -> Result<Bounds, ValidationError> {
    if bounds.is_ordered() {
        Ok(bounds)
    } else {
        Err(ValidationError::InvertedRange {
            field,
            min: bounds.min,
            max: bounds.max,
        })
    }
}

fn canonical_set(kind: FacetKind, values: BTreeSet<String>) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| kind.canonical_value(v))
        .filter(|v| !v.is_empty())
        .collect()
}
