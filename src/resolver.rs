//! Finds the booked loans whose scheduled events fall on a given week.

use crate::book::{LoanBook, StepOutcomes};
use crate::types::Week;

/// Outcomes firing in `week`, read from the book's week index.
/// Empty for an empty book or a quiet week.
pub fn resolve(book: &LoanBook, week: Week) -> StepOutcomes {
    book.scheduled(week).cloned().unwrap_or_default()
}

/// Same result as [`resolve`] computed by scanning every archived entry.
/// O(book size); kept as the reference the index is checked against.
pub fn scan(book: &LoanBook, week: Week) -> StepOutcomes {
    let mut out = StepOutcomes::default();
    for app in book.iter() {
        if app.maturation_at == week {
            out.matured.push(app.id);
            if !app.defaulted {
                out.fully_paid.push(app.id);
            }
        }
        if app.default_at == Some(week) {
            out.defaulted.push(app.id);
        }
        if app.late_payment_at == Some(week) {
            out.repaid_after_default.push(app.id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::book::Feedback;
    use crate::cohort::{CohortGenerator, VolumeModel};
    use crate::config::DistortionParameters;
    use crate::debt::DebtModel;
    use crate::policy::ScoreThreshold;
    use crate::segments::SegmentCatalog;

    fn filled_book(weeks: u32) -> LoanBook {
        let d = DistortionParameters::default();
        let g = CohortGenerator::new(
            &SegmentCatalog::baseline(),
            &DebtModel::historical(),
            VolumeModel::from_distortions(&d),
        )
        .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let mut book = LoanBook::new();
        for w in 1..=weeks {
            let mut cohort = g.generate(Week(w), Feedback::default(), &mut rng);
            ScoreThreshold::new(45.0).label(&mut cohort);
            book.extend_accepted(&cohort);
        }
        book
    }

    #[test]
    fn empty_book_resolves_nothing() {
        let book = LoanBook::new();
        assert!(resolve(&book, Week(1)).is_empty());
        assert!(scan(&book, Week(1)).is_empty());
    }

    #[test]
    fn index_agrees_with_full_scan() {
        let book = filled_book(40);
        assert!(book.len() > 1_000, "book too small: {}", book.len());
        for w in 1..=90 {
            assert_eq!(resolve(&book, Week(w)), scan(&book, Week(w)), "week {w}");
        }
    }

    #[test]
    fn fully_paid_is_subset_of_matured() {
        let book = filled_book(30);
        for w in 1..=70 {
            let o = resolve(&book, Week(w));
            for id in &o.fully_paid {
                assert!(o.matured.contains(id), "week {w}: {id} paid but not matured");
            }
            for id in o.matured.iter().chain(&o.defaulted).chain(&o.repaid_after_default) {
                assert!(book.contains(id));
            }
        }
    }

    #[test]
    fn defaults_resolve_ten_weeks_after_maturity() {
        let book = filled_book(20);
        let week = Week(25);
        for id in &resolve(&book, week).defaulted {
            let app = book.get(id).unwrap();
            assert_eq!(app.maturation_at.offset(10), week);
        }
    }
}
