//! Reservation state machine.
//!
//! ```text
//! (none) -- create --> pending
//! pending -> confirmed -> seated -> completed
//! {pending, confirmed} -> cancelled
//! {confirmed, seated} -> no_show
//! ```
//!
//! completed, cancelled and no_show are terminal.

use crate::error::ServiceError;
use crate::models::ReservationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Target equals the current non-terminal status.
    Unchanged,
}

impl ReservationStatus {
    /// Statuses that hold a table.
    pub const LIVE: [ReservationStatus; 3] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::Seated,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled | ReservationStatus::NoShow
        )
    }

    pub fn can_transition_to(self, target: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Confirmed, Seated)
                | (Seated, Completed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
                | (Seated, NoShow)
        )
    }

    /// Date, time and party size may only change before the guest arrives.
    pub fn is_modifiable(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn transition(self, target: ReservationStatus) -> Result<TransitionOutcome, ServiceError> {
        if self.is_terminal() {
            return Err(ServiceError::TerminalState(self));
        }
        if self == target {
            return Ok(TransitionOutcome::Unchanged);
        }
        if self.can_transition_to(target) {
            Ok(TransitionOutcome::Applied)
        } else {
            Err(ServiceError::InvalidTransition {
                from: self,
                to: target,
            })
        }
    }
}
