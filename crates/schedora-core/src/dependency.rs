//! C4: the dependency predicate, as a pure function over a job and its
//! predecessors' statuses.
//!
//! The bulk `ready_jobs`/`blocked_jobs` queries live on `JobStore` because
//! they need the edge table; this module is what those queries must agree
//! with, and what in-memory callers (tests, the optimistic-claim path) can
//! check without a round-trip.

use crate::job::JobStatus;

/// Empty dependency set, or every predecessor `SUCCESS`.
pub fn dependencies_met(predecessor_statuses: &[JobStatus]) -> bool {
    predecessor_statuses
        .iter()
        .all(|s| *s == JobStatus::Success)
}

/// At least one predecessor landed in a status that can never become
/// `SUCCESS`.
pub fn has_failed_dependencies(predecessor_statuses: &[JobStatus]) -> bool {
    predecessor_statuses.iter().any(|s| {
        matches!(
            s,
            JobStatus::Failed | JobStatus::Dead | JobStatus::Canceled
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    #[test]
    fn empty_dependencies_are_met() {
        assert!(dependencies_met(&[]));
        assert!(!has_failed_dependencies(&[]));
    }

    #[test]
    fn all_success_is_met() {
        assert!(dependencies_met(&[Success, Success]));
    }

    #[test]
    fn any_non_success_is_not_met() {
        assert!(!dependencies_met(&[Success, Running]));
        assert!(!dependencies_met(&[Pending]));
    }

    #[test]
    fn failed_dead_or_canceled_predecessor_is_blocking() {
        assert!(has_failed_dependencies(&[Success, Failed]));
        assert!(has_failed_dependencies(&[Dead]));
        assert!(has_failed_dependencies(&[Canceled]));
        assert!(!has_failed_dependencies(&[Success, Running, Pending]));
    }
}
