use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::cohort::{Application, Cohort};
use crate::events::LoanEvent;
use crate::types::{ApplicationId, Week};

/// Acceptance-rate feedback threaded from one simulate step into the next
/// cohort generation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Feedback {
    pub acceptance_rate: f64,
}

/// Ids of book entries whose events fire in one week.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcomes {
    pub matured: Vec<ApplicationId>,
    pub defaulted: Vec<ApplicationId>,
    pub repaid_after_default: Vec<ApplicationId>,
    /// Matured without default; always a subset of `matured`.
    pub fully_paid: Vec<ApplicationId>,
}

impl StepOutcomes {
    pub fn ids(&self, event: LoanEvent) -> &[ApplicationId] {
        match event {
            LoanEvent::Matured => &self.matured,
            LoanEvent::PaidInFull => &self.fully_paid,
            LoanEvent::Defaulted => &self.defaulted,
            LoanEvent::RepaidAfterDefault => &self.repaid_after_default,
        }
    }

    fn ids_mut(&mut self, event: LoanEvent) -> &mut Vec<ApplicationId> {
        match event {
            LoanEvent::Matured => &mut self.matured,
            LoanEvent::PaidInFull => &mut self.fully_paid,
            LoanEvent::Defaulted => &mut self.defaulted,
            LoanEvent::RepaidAfterDefault => &mut self.repaid_after_default,
        }
    }

    pub fn push(&mut self, event: LoanEvent, id: ApplicationId) {
        self.ids_mut(event).push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.matured.is_empty()
            && self.defaulted.is_empty()
            && self.repaid_after_default.is_empty()
            && self.fully_paid.is_empty()
    }
}

/// Append-only ledger of accepted applications.
///
/// Entries are archived in acceptance order and never removed. Every
/// scheduled event is also indexed under the week it fires, so looking up a
/// week's outcomes does not touch the rest of the book.
#[derive(Debug, Clone, Default)]
pub struct LoanBook {
    entries: Vec<Application>,
    positions: HashMap<ApplicationId, usize>,
    schedule: HashMap<Week, StepOutcomes>,
    acceptance_rate: f64,
}

impl LoanBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ApplicationId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn get(&self, id: &ApplicationId) -> Option<&Application> {
        self.positions.get(id).map(|&i| &self.entries[i])
    }

    /// Archived entries in acceptance order.
    pub fn iter(&self) -> impl Iterator<Item = &Application> {
        self.entries.iter()
    }

    pub fn acceptance_rate(&self) -> f64 {
        self.acceptance_rate
    }

    pub fn set_acceptance_rate(&mut self, rate: f64) {
        self.acceptance_rate = rate;
    }

    pub fn feedback(&self) -> Feedback {
        Feedback { acceptance_rate: self.acceptance_rate }
    }

    /// Add one accepted application. Returns `false` (and changes nothing)
    /// if an entry with the same id is already booked.
    pub fn insert(&mut self, application: Application) -> bool {
        if self.positions.contains_key(&application.id) {
            warn!("application {} is already booked; ignoring duplicate", application.id);
            return false;
        }
        for ev in application.scheduled_events() {
            self.schedule.entry(ev.week).or_default().push(ev.event, ev.id);
        }
        self.positions.insert(application.id, self.entries.len());
        self.entries.push(application);
        true
    }

    /// Book every accepted application of a labeled cohort. Returns how many were added.
    pub fn extend_accepted(&mut self, cohort: &Cohort) -> usize {
        let mut added = 0;
        for app in cohort.accepted() {
            if self.insert(app.clone()) {
                added += 1;
            }
        }
        added
    }

    /// Outcomes indexed for `week`, if any entry has an event then.
    pub fn scheduled(&self, week: Week) -> Option<&StepOutcomes> {
        self.schedule.get(&week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PopulationClass;

    fn app(seq: u32, origin: u32, defaulted: bool, late_lag: Option<u32>) -> Application {
        let maturation_at = Week(origin + 4);
        Application {
            id: ApplicationId::new(PopulationClass::New, Week(origin), seq),
            segment_id: 1,
            origin: Week(origin),
            maturation_at,
            class: PopulationClass::New,
            sum: 1000,
            duration: 30,
            debt: 100,
            score: 55.0,
            defaulted,
            default_at: defaulted.then(|| maturation_at.offset(10)),
            late_payment: late_lag.is_some(),
            late_payment_at: late_lag.map(|l| maturation_at.offset(l)),
            profit: 100.0,
            expected_loan_count: 1.0,
            accepted: Some(true),
        }
    }

    #[test]
    fn new_book_is_empty_with_zero_feedback() {
        let book = LoanBook::new();
        assert!(book.is_empty());
        assert_eq!(book.feedback(), Feedback { acceptance_rate: 0.0 });
        assert!(book.scheduled(Week(1)).is_none());
    }

    #[test]
    fn insert_indexes_every_event_week() {
        let mut book = LoanBook::new();
        assert!(book.insert(app(1, 1, true, Some(3))));
        assert!(book.insert(app(2, 1, false, None)));

        let at5 = book.scheduled(Week(5)).unwrap();
        assert_eq!(at5.matured.len(), 2);
        assert_eq!(at5.fully_paid, vec![ApplicationId::new(PopulationClass::New, Week(1), 2)]);
        assert_eq!(book.scheduled(Week(8)).unwrap().repaid_after_default.len(), 1);
        assert_eq!(book.scheduled(Week(15)).unwrap().defaulted.len(), 1);
        assert!([Week(4), Week(6), Week(7), Week(16)].iter().all(|w| book.scheduled(*w).is_none()));
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let mut book = LoanBook::new();
        assert!(book.insert(app(1, 2, false, None)));
        assert!(!book.insert(app(1, 2, true, None)));
        assert_eq!(book.len(), 1);
        assert!(!book.get(&ApplicationId::new(PopulationClass::New, Week(2), 1)).unwrap().defaulted);
        assert_eq!(book.scheduled(Week(6)).unwrap().matured.len(), 1);
    }

    #[test]
    fn extend_accepted_skips_rejected() {
        let mut rejected = app(2, 3, false, None);
        rejected.accepted = Some(false);
        let mut unlabeled = app(3, 3, false, None);
        unlabeled.accepted = None;
        let cohort = Cohort { week: Week(3), applications: vec![app(1, 3, false, None), rejected, unlabeled] };

        let mut book = LoanBook::new();
        assert_eq!(book.extend_accepted(&cohort), 1);
        assert!(book.contains(&ApplicationId::new(PopulationClass::New, Week(3), 1)));
        assert!(!book.contains(&ApplicationId::new(PopulationClass::New, Week(3), 2)));
    }

    #[test]
    fn outcomes_lookup_by_event() {
        let mut o = StepOutcomes::default();
        assert!(o.is_empty());
        let id = ApplicationId::new(PopulationClass::Repeat, Week(1), 1);
        o.push(LoanEvent::RepaidAfterDefault, id);
        assert_eq!(o.ids(LoanEvent::RepaidAfterDefault), &[id]);
        assert!(o.ids(LoanEvent::Matured).is_empty());
        assert!(!o.is_empty());
    }
}
