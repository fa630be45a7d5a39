use serde::{Deserialize, Serialize};

use crate::cohort::Application;
use crate::types::{ApplicationId, Week};

/// Deferred outcome of an accepted loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanEvent {
    /// Nominal term ends.
    Matured,
    /// Matured without having defaulted.
    PaidInFull,
    /// Went severely overdue (handed to collections).
    Defaulted,
    /// Repaid after having defaulted.
    RepaidAfterDefault,
}

/// A loan event pinned to the week it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub week: Week,
    pub id: ApplicationId,
    pub event: LoanEvent,
}

impl Application {
    /// Every outcome this application will produce, in firing order for a
    /// single week (maturation before paid-in-full).
    pub fn scheduled_events(&self) -> Vec<ScheduledEvent> {
        let at = |week: Week, event: LoanEvent| ScheduledEvent { week, id: self.id, event };
        let mut events = vec![at(self.maturation_at, LoanEvent::Matured)];
        if !self.defaulted {
            events.push(at(self.maturation_at, LoanEvent::PaidInFull));
        }
        if let Some(week) = self.default_at {
            events.push(at(week, LoanEvent::Defaulted));
        }
        if let Some(week) = self.late_payment_at {
            events.push(at(week, LoanEvent::RepaidAfterDefault));
        }
        events
    }
}
