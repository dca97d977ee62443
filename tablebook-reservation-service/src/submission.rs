//! Moderation workflow for restaurants submitted through the public form.
//!
//! ```text
//! submitted -> under_review -> verified -> approved
//! under_review -> owner_invited -> verified
//! any non-terminal -> rejected
//! ```
//!
//! A status change and its audit row commit together. When the stored
//! status is not one the target accepts, nothing is written.

use diesel::prelude::*;
use diesel::PgConnection;
use tracing::info;
use uuid::Uuid;

use crate::authz::{authorize, Actor, Capability};
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::models::{RestaurantSubmission, SubmissionEvent, SubmissionStatus};
use crate::schema::{restaurant_submissions, submission_events};

impl SubmissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Approved | SubmissionStatus::Rejected)
    }

    /// Statuses from which `self` can be entered.
    pub fn allowed_sources(self) -> &'static [SubmissionStatus] {
        use SubmissionStatus::*;
        match self {
            Submitted => &[],
            UnderReview => &[Submitted],
            OwnerInvited => &[UnderReview],
            Verified => &[UnderReview, OwnerInvited],
            Approved => &[Verified],
            Rejected => &[Submitted, UnderReview, OwnerInvited, Verified],
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub name: String,
    pub address: String,
    pub contact_email: String,
    pub submitted_by: Option<Uuid>,
}

#[derive(Debug)]
pub struct TransitionResult {
    pub submission: RestaurantSubmission,
    /// `None` when the transition was skipped.
    pub event: Option<SubmissionEvent>,
}

impl TransitionResult {
    pub fn applied(&self) -> bool {
        self.event.is_some()
    }
}

pub struct SubmissionWorkflow<'a, C: Clock> {
    conn: &'a mut PgConnection,
    clock: &'a C,
}

impl<'a, C: Clock> SubmissionWorkflow<'a, C> {
    pub fn new(conn: &'a mut PgConnection, clock: &'a C) -> Self {
        Self { conn, clock }
    }

    /// Public form entry point; no audit row is written for creation.
    pub fn create(&mut self, request: NewSubmission) -> Result<RestaurantSubmission, ServiceError> {
        let name = request.name.trim();
        let address = request.address.trim();
        let contact_email = request.contact_email.trim();
        if name.is_empty() || address.is_empty() {
            return Err(ServiceError::validation("Name and address are required"));
        }
        if !contact_email.contains('@') {
            return Err(ServiceError::validation("Invalid contact_email"));
        }

        let now = self.clock.now();
        let submission = diesel::insert_into(restaurant_submissions::table)
            .values(RestaurantSubmission {
                id: Uuid::new_v4(),
                name: name.to_string(),
                address: address.to_string(),
                contact_email: contact_email.to_string(),
                submitted_by: request.submitted_by,
                status: SubmissionStatus::Submitted,
                created_at: now,
                updated_at: now,
            })
            .returning(RestaurantSubmission::as_returning())
            .get_result(self.conn)?;

        info!(submission_id = %submission.id, "restaurant submitted");
        Ok(submission)
    }

    pub fn get(
        &mut self,
        actor: &Actor,
        submission_id: Uuid,
    ) -> Result<RestaurantSubmission, ServiceError> {
        authorize(actor, Capability::Admin)?;
        Ok(find_submission(self.conn, submission_id)?)
    }

    pub fn transition(
        &mut self,
        actor: &Actor,
        submission_id: Uuid,
        target: SubmissionStatus,
    ) -> Result<TransitionResult, ServiceError> {
        authorize(actor, Capability::Admin)?;
        let now = self.clock.now();

        self.conn.transaction::<_, ServiceError, _>(|conn| {
            let current = find_submission(conn, submission_id)?;
            if current.status.is_terminal() {
                return Err(ServiceError::SubmissionClosed(current.status));
            }

            let updated = diesel::update(
                restaurant_submissions::table
                    .filter(restaurant_submissions::id.eq(submission_id))
                    .filter(restaurant_submissions::status.eq_any(target.allowed_sources())),
            )
            .set((
                restaurant_submissions::status.eq(target),
                restaurant_submissions::updated_at.eq(now),
            ))
            .returning(RestaurantSubmission::as_returning())
            .get_result(conn)
            .optional()?;

            let Some(submission) = updated else {
                info!(
                    submission_id = %submission_id,
                    status = current.status.as_str(),
                    target = target.as_str(),
                    "submission transition skipped"
                );
                return Ok(TransitionResult {
                    submission: find_submission(conn, submission_id)?,
                    event: None,
                });
            };

            let event = diesel::insert_into(submission_events::table)
                .values(SubmissionEvent {
                    id: Uuid::new_v4(),
                    submission_id,
                    event: target.as_str().to_string(),
                    actor_id: actor.user_id,
                    created_at: now,
                })
                .returning(SubmissionEvent::as_returning())
                .get_result(conn)?;

            info!(
                submission_id = %submission_id,
                actor_id = %actor.user_id,
                from = current.status.as_str(),
                to = target.as_str(),
                "submission status changed"
            );
            Ok(TransitionResult {
                submission,
                event: Some(event),
            })
        })
    }

    /// Audit trail, oldest first.
    pub fn events(
        &mut self,
        actor: &Actor,
        submission_id: Uuid,
    ) -> Result<Vec<SubmissionEvent>, ServiceError> {
        authorize(actor, Capability::Admin)?;
        let submission = find_submission(self.conn, submission_id)?;

        Ok(SubmissionEvent::belonging_to(&submission)
            .select(SubmissionEvent::as_select())
            .order(submission_events::created_at.asc())
            .load(self.conn)?)
    }
}

fn find_submission(
    conn: &mut PgConnection,
    submission_id: Uuid,
) -> QueryResult<RestaurantSubmission> {
    restaurant_submissions::table
        .find(submission_id)
        .select(RestaurantSubmission::as_select())
        .first(conn)
}
