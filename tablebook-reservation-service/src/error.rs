use thiserror::Error;
use tonic::Status;
use tracing::error;

use crate::models::{ReservationStatus, SubmissionStatus};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Forbidden")]
    Forbidden,
    #[error("Slot is no longer available")]
    CapacityConflict,
    #[error("Modification window has closed")]
    CutoffViolation,
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    #[error("Reservation is already {0:?}")]
    TerminalState(ReservationStatus),
    #[error("Submission is already {0:?}")]
    SubmissionClosed(SubmissionStatus),
    #[error("Unexpected internal error")]
    Internal(diesel::result::Error),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}

impl From<diesel::result::Error> for ServiceError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => ServiceError::NotFound,
            err => ServiceError::Internal(err),
        }
    }
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => Status::invalid_argument(message),
            ServiceError::NotFound => Status::not_found("Not found"),
            ServiceError::Forbidden => Status::permission_denied("Forbidden"),
            ServiceError::CapacityConflict => Status::aborted(
                "This time slot is no longer available, please pick another time",
            ),
            ServiceError::CutoffViolation => Status::failed_precondition(
                "This reservation can no longer be changed online, please contact the restaurant",
            ),
            ServiceError::InvalidTransition { .. } => {
                Status::failed_precondition("Unsupported state transition")
            }
            ServiceError::TerminalState(_) => {
                Status::failed_precondition("Reservation is already closed")
            }
            ServiceError::SubmissionClosed(_) => {
                Status::failed_precondition("Submission is already closed")
            }
            ServiceError::Internal(err) => {
                error!(error = %err, "database error");
                Status::internal("Internal server error")
            }
        }
    }
}
