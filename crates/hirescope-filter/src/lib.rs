//! Faceted listing filter engine.
//!
//! [`FilterSession`] owns the criteria for one view and keeps facet flags in
//! step with them; [`evaluate`] turns criteria plus a listing collection into
//! a [`ResultPage`].

pub mod criteria;
pub mod error;
pub mod evaluate;
pub mod facets;
pub mod session;

pub use criteria::{
    CriteriaUpdate, FilterCriteria, PageWindow, SetField, SortOrder, DATE_POSTED_ANY,
    DEFAULT_DESTINATION, DEFAULT_SALARY,
};
pub use error::{FacetConfigError, ValidationError};
pub use evaluate::{evaluate, evaluate_visible, facet_counts, matches, FacetCount, ResultPage, VisibleResults};
pub use facets::{FacetConfig, FacetGroup, FacetKind, FacetStore, FacetValue, Selection};
pub use session::FilterSession;

pub const CRATE_NAME: &str = "hirescope-filter";
