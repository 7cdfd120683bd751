//! Query evaluation: predicate chain, id sort and page window.

use hirescope_core::{DataUnavailableError, Listing};
use serde::Serialize;
use tracing::debug;

use crate::criteria::{FilterCriteria, PageWindow, SortOrder, DATE_POSTED_ANY};
use crate::facets::FacetGroup;

/// One evaluated window over the filtered, sorted listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub items: Vec<Listing>,
    pub total_matched: usize,
    pub offset: usize,
    pub limit: usize,
}

impl ResultPage {
    pub fn empty(window: PageWindow) -> Self {
        Self {
            items: Vec::new(),
            total_matched: 0,
            offset: window.offset,
            limit: window.limit,
        }
    }

    pub fn ids(&self) -> Vec<u64> {
        self.items.iter().map(|l| l.id).collect()
    }
}

/// What the rendering layer gets: either a page, or an explicit "no data"
/// signal that must not be shown as zero matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VisibleResults {
    Ready { page: ResultPage },
    NoData { reason: String, page: ResultPage },
}

impl VisibleResults {
    pub fn page(&self) -> &ResultPage {
        match self {
            VisibleResults::Ready { page } | VisibleResults::NoData { page, .. } => page,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, VisibleResults::NoData { .. })
    }
}

/// Per-value match count for a facet group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetCount {
    pub id: u32,
    pub value: String,
    pub count: usize,
}

/// Lowercased needles, computed once per evaluation.
struct Needles<'a> {
    criteria: &'a FilterCriteria,
    keyword: String,
    location: String,
    category: String,
}

impl<'a> Needles<'a> {
    fn new(criteria: &'a FilterCriteria) -> Self {
        Self {
            criteria,
            keyword: criteria.keyword().to_lowercase(),
            location: criteria.location().to_lowercase(),
            category: criteria.category().to_lowercase(),
        }
    }

    fn matches(&self, listing: &Listing) -> bool {
        let c = self.criteria;

        if !self.keyword.is_empty() && !listing.title.to_lowercase().contains(&self.keyword) {
            return false;
        }

        if !self.location.is_empty() {
            match &listing.location_name {
                Some(name) if name.to_lowercase().contains(&self.location) => {}
                _ => return false,
            }
        }

        // Range facets are never vacuous: a listing without a range, or with
        // one reaching past the bounds, is dropped even at default bounds.
        match &listing.destination_range {
            Some(range) if c.destination().contains_range(range) => {}
            _ => return false,
        }

        if !self.category.is_empty() {
            match &listing.category {
                Some(category) if category.to_lowercase() == self.category => {}
                _ => return false,
            }
        }

        if !c.job_types().is_empty()
            && !listing
                .normalized_job_types()
                .iter()
                .any(|t| c.job_types().contains(t))
        {
            return false;
        }

        let date_posted = c.date_posted();
        if !date_posted.is_empty() && date_posted != DATE_POSTED_ANY {
            match listing.normalized_created_at() {
                Some(created) if created.contains(date_posted) => {}
                _ => return false,
            }
        }

        if !c.experience_levels().is_empty() {
            match listing.normalized_experience_level() {
                Some(level) if c.experience_levels().contains(&level) => {}
                _ => return false,
            }
        }

        match &listing.salary_range {
            Some(range) if c.salary().contains_range(range) => {}
            _ => return false,
        }

        if !c.tag().is_empty() && listing.tag.as_deref() != Some(c.tag()) {
            return false;
        }

        true
    }
}

/// True when `listing` passes every active predicate of `criteria`.
pub fn matches(listing: &Listing, criteria: &FilterCriteria) -> bool {
    Needles::new(criteria).matches(listing)
}

/// Filter, sort and paginate. Never mutates `listings`.
pub fn evaluate(listings: &[Listing], criteria: &FilterCriteria) -> ResultPage {
    let needles = Needles::new(criteria);
    let mut matched = listings
        .iter()
        .filter(|l| needles.matches(l))
        .collect::<Vec<_>>();

    // sort_by is stable, so equal ids keep fetch order.
    match criteria.sort() {
        SortOrder::None => {}
        SortOrder::Ascending => matched.sort_by(|a, b| a.id.cmp(&b.id)),
        SortOrder::Descending => matched.sort_by(|a, b| b.id.cmp(&a.id)),
    }

    let total_matched = matched.len();
    let window = criteria.page();
    let start = window.offset.min(total_matched);
    let end = if window.limit == 0 {
        total_matched
    } else {
        window.offset.saturating_add(window.limit).min(total_matched)
    };
    let items = matched[start..end]
        .iter()
        .map(|l| (*l).clone())
        .collect::<Vec<_>>();

    debug!(
        listings = listings.len(),
        total_matched,
        returned = items.len(),
        "evaluated criteria"
    );

    ResultPage {
        items,
        total_matched,
        offset: window.offset,
        limit: window.limit,
    }
}

/// Evaluate against a collection that may have failed to load.
pub fn evaluate_visible(
    listings: Result<&[Listing], &DataUnavailableError>,
    criteria: &FilterCriteria,
) -> VisibleResults {
    match listings {
        Ok(listings) => VisibleResults::Ready {
            page: evaluate(listings, criteria),
        },
        Err(err) => VisibleResults::NoData {
            reason: err.reason.clone(),
            page: ResultPage::empty(criteria.page()),
        },
    }
}

/// For each value in `group`, the number of listings that would match if that
/// value were the group's only selection, all other facets unchanged.
pub fn facet_counts(listings: &[Listing], criteria: &FilterCriteria, group: &FacetGroup) -> Vec<FacetCount> {
    group
        .values()
        .iter()
        .map(|value| {
            let narrowed = criteria.with_only_selection(group.kind(), &value.value);
            let needles = Needles::new(&narrowed);
            FacetCount {
                id: value.id,
                value: value.value.clone(),
                count: listings.iter().filter(|l| needles.matches(l)).count(),
            }
        })
        .collect()
}
