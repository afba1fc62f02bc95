//! C1: the job state machine. Pure rules, no I/O.
//!
//! `PENDING -> RUNNING` is a legal edge so a claim-and-run path need not
//! pass through `SCHEDULED`, but the scheduler (see `scheduler.rs`) always
//! tags jobs `SCHEDULED` before they run. Both paths are accepted by the
//! table below; tests should accept either.

use crate::error::{Result, SchedoraError};
use crate::job::JobStatus;
use JobStatus::*;

/// `true` iff `from -> to` is a legal edge in the transition table.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (Pending, Scheduled)
            | (Pending, Running)
            | (Pending, Canceled)
            | (Scheduled, Running)
            | (Scheduled, Canceled)
            | (Running, Success)
            | (Running, Failed)
            | (Running, Retrying)
            | (Running, Canceled)
            | (Failed, Retrying)
            | (Failed, Dead)
            | (Retrying, Scheduled)
    )
}

/// Same check, but fails with `InvalidStateTransition` instead of
/// returning a bool — the form callers that mutate state should use.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(SchedoraError::InvalidStateTransition { from, to })
    }
}

/// Terminal statuses have no outgoing edges.
pub fn is_terminal(status: JobStatus) -> bool {
    matches!(status, Success | Dead | Canceled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_go_to_scheduled_running_or_canceled() {
        assert!(can_transition(Pending, Scheduled));
        assert!(can_transition(Pending, Running));
        assert!(can_transition(Pending, Canceled));
        assert!(!can_transition(Pending, Success));
        assert!(!can_transition(Pending, Failed));
    }

    #[test]
    fn running_can_reach_every_terminal_and_retrying() {
        assert!(can_transition(Running, Success));
        assert!(can_transition(Running, Failed));
        assert!(can_transition(Running, Retrying));
        assert!(can_transition(Running, Canceled));
        assert!(!can_transition(Running, Pending));
        assert!(!can_transition(Running, Scheduled));
    }

    #[test]
    fn failed_can_only_retry_or_die() {
        assert!(can_transition(Failed, Retrying));
        assert!(can_transition(Failed, Dead));
        assert!(!can_transition(Failed, Success));
        assert!(!can_transition(Failed, Running));
    }

    #[test]
    fn retrying_goes_only_to_scheduled() {
        assert!(can_transition(Retrying, Scheduled));
        assert!(!can_transition(Retrying, Running));
        assert!(!can_transition(Retrying, Pending));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [Success, Dead, Canceled] {
            assert!(is_terminal(terminal));
            for to in [Pending, Scheduled, Running, Retrying, Success, Failed, Dead, Canceled] {
                assert!(!can_transition(terminal, to), "{terminal:?} -> {to:?} should be illegal");
            }
        }
    }

    #[test]
    fn non_terminal_states_are_not_terminal() {
        for s in [Pending, Scheduled, Running, Retrying, Failed] {
            assert!(!is_terminal(s));
        }
    }

    #[test]
    fn validate_transition_surfaces_the_right_error() {
        let err = validate_transition(Success, Running).unwrap_err();
        match err {
            SchedoraError::InvalidStateTransition { from, to } => {
                assert_eq!(from, Success);
                assert_eq!(to, Running);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
