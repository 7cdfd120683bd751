//! Per-view filter session: the single mutation entry point.
//!
//! Every write to the criteria goes through [`FilterSession`], which
//! reconciles the facet store in the same call. Facet-side toggles are
//! translated into criteria mutations first, so both directions share one path.

use std::collections::BTreeMap;

use hirescope_core::{DataUnavailableError, Listing};
use tracing::debug;

use crate::criteria::{CriteriaUpdate, FilterCriteria, SetField};
use crate::error::ValidationError;
use crate::evaluate::{evaluate, evaluate_visible, facet_counts, FacetCount, ResultPage, VisibleResults};
use crate::facets::{FacetKind, FacetStore};

#[derive(Debug, Clone)]
pub struct FilterSession {
    criteria: FilterCriteria,
    facets: FacetStore,
}

impl Default for FilterSession {
    fn default() -> Self {
        Self::new(FacetStore::builtin())
    }
}

impl FilterSession {
    pub fn new(mut facets: FacetStore) -> Self {
        let criteria = FilterCriteria::default();
        facets.reconcile(&criteria);
        Self { criteria, facets }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Read-only facet snapshot for rendering checkboxes and radios.
    pub fn facets(&self) -> &FacetStore {
        &self.facets
    }

    pub fn set_field(&mut self, update: CriteriaUpdate) -> Result<(), ValidationError> {
        let kind = update.facet_kind();
        self.criteria.set_field(update)?;
        if let Some(kind) = kind {
            self.facets.reconcile_kind(kind, &self.criteria);
        }
        Ok(())
    }

    pub fn set_field_by_name(&mut self, name: &str, raw: &str) -> Result<(), ValidationError> {
        self.set_field(CriteriaUpdate::parse(name, raw)?)
    }

    /// Apply a batch of name-keyed assignments, as one request or command line
    /// carries them. Repeated set-valued names accumulate. The min and max
    /// halves of a range are merged with the current bounds before validation,
    /// so their order in the batch does not matter. On error nothing changes.
    pub fn apply_assignments<'a, I>(&mut self, assignments: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut staged = self.clone();
        let mut sets = BTreeMap::<SetField, Vec<&str>>::new();
        let mut destination = None;
        let mut salary = None;

        for (name, raw) in assignments {
            if let Ok(field) = name.parse::<SetField>() {
                sets.entry(field).or_default().push(raw);
                continue;
            }
            match CriteriaUpdate::parse(name, raw)? {
                CriteriaUpdate::DestinationMin(min) => {
                    destination.get_or_insert(self.criteria.destination()).min = min
                }
                CriteriaUpdate::DestinationMax(max) => {
                    destination.get_or_insert(self.criteria.destination()).max = max
                }
                CriteriaUpdate::SalaryMin(min) => salary.get_or_insert(self.criteria.salary()).min = min,
                CriteriaUpdate::SalaryMax(max) => salary.get_or_insert(self.criteria.salary()).max = max,
                update => staged.set_field(update)?,
            }
        }

        for (field, values) in sets {
            staged.set_field_by_name(&field.to_string(), &values.join(","))?;
        }
        if let Some(bounds) = destination {
            staged.set_field(CriteriaUpdate::Destination(bounds))?;
        }
        if let Some(bounds) = salary {
            staged.set_field(CriteriaUpdate::Salary(bounds))?;
        }

        *self = staged;
        Ok(())
    }

    pub fn toggle_set_member(&mut self, field: SetField, value: &str) -> Result<bool, ValidationError> {
        let now_member = self.criteria.toggle_set_member(field, value)?;
        self.facets.reconcile_kind(field.facet_kind(), &self.criteria);
        Ok(now_member)
    }

    pub fn toggle_set_member_by_name(&mut self, name: &str, value: &str) -> Result<bool, ValidationError> {
        self.toggle_set_member(name.parse()?, value)
    }

    /// UI-side toggle of a facet value by id. Multi-select groups flip
    /// membership; single-select groups select the value, or clear the
    /// field when the value was already selected.
    pub fn toggle_facet(&mut self, kind: FacetKind, id: u32) -> Result<(), ValidationError> {
        let facet_value = self
            .facets
            .group(kind)
            .and_then(|g| g.find(id))
            .ok_or(ValidationError::UnknownFacetValue { kind, id })?;
        let value = facet_value.value.clone();
        let was_selected = facet_value.is_selected();
        debug!(%kind, id, %value, was_selected, "facet toggle");

        match kind {
            FacetKind::JobTypes => {
                self.toggle_set_member(SetField::JobTypes, &value)?;
            }
            FacetKind::ExperienceLevels => {
                self.toggle_set_member(SetField::ExperienceLevels, &value)?;
            }
            FacetKind::DatePosted | FacetKind::Tag => {
                let next = if was_selected { String::new() } else { value };
                let update = if kind == FacetKind::DatePosted {
                    CriteriaUpdate::DatePosted(next)
                } else {
                    CriteriaUpdate::Tag(next)
                };
                self.set_field(update)?;
            }
        }
        Ok(())
    }

    /// Restore default criteria and clear every facet flag in one step.
    pub fn reset_all(&mut self) {
        self.criteria.reset();
        self.facets.reconcile(&self.criteria);
        debug!("filter session reset");
    }

    pub fn results(&self, listings: &[Listing]) -> ResultPage {
        evaluate(listings, &self.criteria)
    }

    pub fn visible_results(&self, listings: Result<&[Listing], &DataUnavailableError>) -> VisibleResults {
        evaluate_visible(listings, &self.criteria)
    }

    pub fn facet_counts(&self, listings: &[Listing], kind: FacetKind) -> Vec<FacetCount> {
        self.facets
            .group(kind)
            .map(|group| facet_counts(listings, &self.criteria, group))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hirescope_core::Bounds;

    fn assert_consistent(session: &FilterSession) {
        assert!(
            session.facets().is_consistent_with(session.criteria()),
            "facet flags diverged from criteria: {:?}",
            session.criteria()
        );
    }

    fn selected(session: &FilterSession, kind: FacetKind) -> Vec<String> {
        session
            .facets()
            .group(kind)
            .unwrap()
            .selected_values()
            .map(|v| v.value.clone())
            .collect()
    }

    #[test]
    fn criteria_toggles_flip_facet_flags() {
        let mut session = FilterSession::default();
        assert!(session.toggle_set_member(SetField::JobTypes, "Full Time").unwrap());
        assert_eq!(selected(&session, FacetKind::JobTypes), vec!["full-time"]);
        assert_consistent(&session);

        assert!(!session.toggle_set_member_by_name("jobTypes", "full-time").unwrap());
        assert!(selected(&session, FacetKind::JobTypes).is_empty());
        assert_consistent(&session);
    }

    #[test]
    fn facet_toggles_update_criteria() {
        let mut session = FilterSession::default();
        // Entry Level is the second experience value.
        session.toggle_facet(FacetKind::ExperienceLevels, 2).unwrap();
        assert!(session.criteria().experience_levels().contains("entry-level"));
        assert_consistent(&session);

        session.toggle_facet(FacetKind::ExperienceLevels, 2).unwrap();
        assert!(session.criteria().experience_levels().is_empty());
        assert_consistent(&session);
    }

    #[test]
    fn radio_groups_hold_a_single_selection() {
        let mut session = FilterSession::default();
        session.toggle_facet(FacetKind::DatePosted, 3).unwrap();
        assert_eq!(session.criteria().date_posted(), "last-24-hours");
        session.toggle_facet(FacetKind::DatePosted, 4).unwrap();
        assert_eq!(selected(&session, FacetKind::DatePosted), vec!["last-7-days"]);
        assert_consistent(&session);

        session.toggle_facet(FacetKind::DatePosted, 4).unwrap();
        assert_eq!(session.criteria().date_posted(), "");
        assert!(selected(&session, FacetKind::DatePosted).is_empty());

        session.toggle_facet(FacetKind::Tag, 1).unwrap();
        assert_eq!(session.criteria().tag(), "Remote");
        session.set_field(CriteriaUpdate::Tag("Urgent".into())).unwrap();
        assert_eq!(selected(&session, FacetKind::Tag), vec!["Urgent"]);
        assert_consistent(&session);
    }

    #[test]
    fn replacing_a_set_resyncs_flags() {
        let mut session = FilterSession::default();
        session.toggle_set_member(SetField::JobTypes, "internship").unwrap();
        session.set_field_by_name("jobTypes", "Part Time,Freelancer").unwrap();
        assert_eq!(
            selected(&session, FacetKind::JobTypes),
            vec!["part-time", "freelancer"]
        );
        assert_consistent(&session);
    }

    #[test]
    fn batched_range_halves_apply_in_any_order() {
        for batch in [
            [("salaryMin", "25000"), ("salaryMax", "30000")],
            [("salaryMax", "30000"), ("salaryMin", "25000")],
        ] {
            let mut session = FilterSession::default();
            session.apply_assignments(batch).unwrap();
            assert_eq!(session.criteria().salary(), Bounds::new(25_000, 30_000));
        }

        let mut session = FilterSession::default();
        session
            .apply_assignments([("destination_min", "150"), ("destinationMax", "200"), ("keyword", "rust")])
            .unwrap();
        assert_eq!(session.criteria().destination(), Bounds::new(150, 200));
        assert_eq!(session.criteria().keyword(), "rust");
    }

    #[test]
    fn batched_assignments_are_all_or_nothing() {
        let mut session = FilterSession::default();
        session.set_field(CriteriaUpdate::Salary(Bounds::new(100, 200))).unwrap();

        let err = session
            .apply_assignments([("keyword", "rust"), ("jobTypes", "Full Time"), ("salaryMin", "500")])
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvertedRange { field: "salary", .. }));
        assert_eq!(session.criteria().keyword(), "");
        assert!(session.criteria().job_types().is_empty());
        assert_eq!(session.criteria().salary(), Bounds::new(100, 200));
        assert_consistent(&session);
    }

    #[test]
    fn batched_set_values_accumulate() {
        let mut session = FilterSession::default();
        session
            .apply_assignments([("experienceLevels", "Mid Level"), ("experience_levels", "director")])
            .unwrap();
        assert_eq!(session.criteria().experience_levels().len(), 2);
        assert_eq!(selected(&session, FacetKind::ExperienceLevels), vec!["mid-level", "director"]);
        assert_consistent(&session);
    }

    #[test]
    fn unknown_facet_id_is_rejected() {
        let mut session = FilterSession::default();
        assert_eq!(
            session.toggle_facet(FacetKind::Tag, 99).unwrap_err(),
            ValidationError::UnknownFacetValue {
                kind: FacetKind::Tag,
                id: 99
            }
        );
        assert!(session.criteria().is_default());
    }

    #[test]
    fn rejected_mutation_keeps_state_and_flags() {
        let mut session = FilterSession::default();
        session.toggle_set_member(SetField::ExperienceLevels, "director").unwrap();
        session.set_field(CriteriaUpdate::Salary(Bounds::new(100, 200))).unwrap();
        let before = session.criteria().clone();

        assert!(session.set_field_by_name("salaryMin", "500").is_err());
        assert!(session.set_field_by_name("nope", "1").is_err());
        assert_eq!(session.criteria(), &before);
        assert_consistent(&session);
    }

    #[test]
    fn consistency_holds_across_a_mutation_sequence() {
        let mut session = FilterSession::default();
        let steps: [fn(&mut FilterSession); 9] = [
            |s: &mut FilterSession| s.toggle_facet(FacetKind::JobTypes, 1).unwrap(),
            |s: &mut FilterSession| s.toggle_facet(FacetKind::JobTypes, 3).unwrap(),
            |s: &mut FilterSession| s.set_field_by_name("datePosted", "Last Hour").unwrap(),
            |s: &mut FilterSession| s.toggle_facet(FacetKind::Tag, 2).unwrap(),
            |s: &mut FilterSession| {
                let _ = s.set_field_by_name("destinationMin", "500");
            },
            |s: &mut FilterSession| {
                s.toggle_set_member(SetField::ExperienceLevels, "Associate").unwrap();
            },
            |s: &mut FilterSession| s.toggle_facet(FacetKind::JobTypes, 1).unwrap(),
            |s: &mut FilterSession| s.set_field_by_name("experienceLevels", "").unwrap(),
            |s: &mut FilterSession| s.set_field_by_name("datePosted", "all").unwrap(),
        ];
        for step in steps {
            step(&mut session);
            assert_consistent(&session);
        }
        assert_eq!(selected(&session, FacetKind::DatePosted), vec!["all"]);
        assert_eq!(selected(&session, FacetKind::JobTypes), vec!["remote-jobs"]);
    }

    #[test]
    fn reset_all_is_complete() {
        let mut session = FilterSession::default();
        session.set_field_by_name("keyword", "rust").unwrap();
        session.toggle_facet(FacetKind::JobTypes, 2).unwrap();
        session.toggle_facet(FacetKind::DatePosted, 2).unwrap();
        session.toggle_facet(FacetKind::ExperienceLevels, 5).unwrap();
        session.toggle_facet(FacetKind::Tag, 3).unwrap();
        session.set_field_by_name("sort", "desc").unwrap();
        assert!(session.facets().any_selected());

        session.reset_all();
        assert_eq!(session.criteria(), &FilterCriteria::default());
        assert!(!session.facets().any_selected());
        assert_consistent(&session);
    }

    #[test]
    fn sessions_are_independent() {
        let mut a = FilterSession::default();
        let b = a.clone();
        a.toggle_facet(FacetKind::JobTypes, 1).unwrap();
        assert!(b.criteria().is_default());
        assert!(!b.facets().any_selected());
    }

    #[test]
    fn session_results_follow_criteria() {
        let listings = vec![
            Listing::new(1, "Backend Engineer")
                .with_destination(0, 10)
                .with_salary(0, 10)
                .with_job_types(["Full Time"]),
            Listing::new(2, "Frontend Engineer")
                .with_destination(0, 10)
                .with_salary(0, 10)
                .with_job_types(["Part Time"]),
        ];
        let mut session = FilterSession::default();
        assert_eq!(session.results(&listings).total_matched, 2);
        session.toggle_facet(FacetKind::JobTypes, 2).unwrap();
        assert_eq!(session.results(&listings).ids(), vec![2]);

        let counts = session.facet_counts(&listings, FacetKind::JobTypes);
        assert_eq!(counts[0].count, 1);
        assert_eq!(counts[4].count, 0);

        let err = DataUnavailableError::new("offline");
        assert!(session.visible_results(Err(&err)).is_no_data());
    }
}
