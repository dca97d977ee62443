use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tablebook_proto::reservation_service::{
    reservation_service_server::{ReservationService, ReservationServiceServer},
    AvailabilitySettings, CancelReservationPayload, CreateReservationPayload,
    GetAvailabilityPayload, GetAvailabilityResponse, GetAvailabilitySettingsPayload,
    GetReservationPayload, ListReservationsPayload, ListReservationsResponse,
    ModifyReservationPayload, Reservation, TransitionReservationPayload,
    UpdateAvailabilitySettingsPayload,
};
use tablebook_proto::submission_service::{
    submission_service_server::{SubmissionService, SubmissionServiceServer},
    CreateSubmissionPayload, GetSubmissionPayload, ListSubmissionEventsPayload,
    ListSubmissionEventsResponse, Submission, TransitionSubmissionPayload,
    TransitionSubmissionResponse,
};
use tablebook_proto::{reservation_service, submission_service};
use tablebook_reservation_service::authz::Actor;
use tablebook_reservation_service::clock::{parse_date, parse_time, Clock, SystemClock};
use tablebook_reservation_service::config::Config;
use tablebook_reservation_service::establish_connection;
use tablebook_reservation_service::error::ServiceError;
use tablebook_reservation_service::models::{ReservationStatus, SubmissionStatus};
use tablebook_reservation_service::reservation::{
    NewReservation, OwnerUpdate, ReservationManager, ReservationPatch,
};
use tablebook_reservation_service::serializer::{
    deserialize_settings, serialize_reservation, serialize_settings, serialize_slot,
    serialize_submission, serialize_submission_event,
};
use tablebook_reservation_service::submission::{NewSubmission, SubmissionWorkflow};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info};
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Runs `f` on a fresh connection off the async runtime.
async fn with_connection<T, F>(config: Arc<Config>, f: F) -> Result<T, Status>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&config).map_err(|err| {
            error!(error = %err, "cannot connect to database");
            Status::unavailable("Database unavailable")
        })?;
        f(&mut conn).map_err(Status::from)
    })
    .await
    .map_err(|err| {
        error!(error = %err, "blocking task failed");
        Status::internal("Internal server error")
    })?
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, Status> {
    Uuid::from_str(value).map_err(|_| Status::invalid_argument(format!("Invalid {field}")))
}

fn parse_optional<T>(
    value: Option<String>,
    parse: impl Fn(&str) -> Result<T, ServiceError>,
) -> Result<Option<T>, Status> {
    value
        .map(|v| parse(&v))
        .transpose()
        .map_err(Status::from)
}

fn parse_reservation_time(date: &str, time: &str) -> Result<(NaiveDate, NaiveTime), Status> {
    Ok((parse_date(date)?, parse_time(time)?))
}

pub struct ReservationServiceImpl<C> {
    config: Arc<Config>,
    clock: Arc<C>,
}

impl<C: Clock + 'static> ReservationServiceImpl<C> {
    pub fn new(config: Arc<Config>, clock: Arc<C>) -> Self {
        Self { config, clock }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, Status>
    where
        T: Send + 'static,
        F: FnOnce(&mut ReservationManager<'_, C>) -> Result<T, ServiceError> + Send + 'static,
    {
        let clock = self.clock.clone();
        with_connection(self.config.clone(), move |conn| {
            f(&mut ReservationManager::new(conn, clock.as_ref()))
        })
        .await
    }
}

#[tonic::async_trait]
impl<C: Clock + 'static> ReservationService for ReservationServiceImpl<C> {
    async fn get_availability(
        &self,
        request: Request<GetAvailabilityPayload>,
    ) -> Result<Response<GetAvailabilityResponse>, Status> {
        let payload = request.into_inner();
        let restaurant_id = parse_uuid(&payload.restaurant_id, "restaurant_id")?;
        let date = parse_date(&payload.date)?;
        let party_size = payload.party_size;

        let slots = self
            .run(move |m| m.availability(restaurant_id, date, party_size))
            .await?;

        Ok(Response::new(GetAvailabilityResponse {
            slots: slots.iter().map(serialize_slot).collect(),
        }))
    }

    async fn get_availability_settings(
        &self,
        request: Request<GetAvailabilitySettingsPayload>,
    ) -> Result<Response<AvailabilitySettings>, Status> {
        let restaurant_id = parse_uuid(&request.into_inner().restaurant_id, "restaurant_id")?;

        let schedule = self.run(move |m| m.settings(restaurant_id)).await?;

        Ok(Response::new(serialize_settings(restaurant_id, &schedule)))
    }

    async fn update_availability_settings(
        &self,
        request: Request<UpdateAvailabilitySettingsPayload>,
    ) -> Result<Response<AvailabilitySettings>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let settings = payload
            .settings
            .ok_or(Status::invalid_argument("settings must be set"))?;
        let restaurant_id = parse_uuid(&settings.restaurant_id, "restaurant_id")?;
        let schedule = deserialize_settings(&settings)?;

        let schedule = self
            .run(move |m| m.update_settings(&actor, restaurant_id, schedule))
            .await?;

        Ok(Response::new(serialize_settings(restaurant_id, &schedule)))
    }

    async fn create_reservation(
        &self,
        request: Request<CreateReservationPayload>,
    ) -> Result<Response<Reservation>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let (date, time) = parse_reservation_time(&payload.date, &payload.time)?;
        let new_reservation = NewReservation {
            restaurant_id: parse_uuid(&payload.restaurant_id, "restaurant_id")?,
            date,
            time,
            party_size: payload.party_size,
            special_requests: payload.special_requests,
            occasion: payload.occasion,
        };

        let reservation = self
            .run(move |m| m.create(&actor, new_reservation))
            .await?;

        Ok(Response::new(serialize_reservation(&reservation)))
    }

    async fn get_reservation(
        &self,
        request: Request<GetReservationPayload>,
    ) -> Result<Response<Reservation>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let reservation_id = parse_uuid(&payload.reservation_id, "reservation_id")?;

        let reservation = self.run(move |m| m.get(&actor, reservation_id)).await?;

        Ok(Response::new(serialize_reservation(&reservation)))
    }

    async fn list_reservations(
        &self,
        request: Request<ListReservationsPayload>,
    ) -> Result<Response<ListReservationsResponse>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let restaurant_id = payload
            .restaurant_id
            .map(|rid| parse_uuid(&rid, "restaurant_id"))
            .transpose()?;
        let date = parse_optional(payload.date, parse_date)?;

        let reservations = self
            .run(move |m| m.list(&actor, restaurant_id, date))
            .await?;

        Ok(Response::new(ListReservationsResponse {
            reservations: reservations.iter().map(serialize_reservation).collect(),
        }))
    }

    async fn cancel_reservation(
        &self,
        request: Request<CancelReservationPayload>,
    ) -> Result<Response<Reservation>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let reservation_id = parse_uuid(&payload.reservation_id, "reservation_id")?;

        let reservation = self.run(move |m| m.cancel(&actor, reservation_id)).await?;

        Ok(Response::new(serialize_reservation(&reservation)))
    }

    async fn modify_reservation(
        &self,
        request: Request<ModifyReservationPayload>,
    ) -> Result<Response<Reservation>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let reservation_id = parse_uuid(&payload.reservation_id, "reservation_id")?;
        let patch = ReservationPatch {
            date: parse_optional(payload.date, parse_date)?,
            time: parse_optional(payload.time, parse_time)?,
            party_size: payload.party_size,
            special_requests: payload.special_requests,
            occasion: payload.occasion,
        };

        let reservation = self
            .run(move |m| m.modify(&actor, reservation_id, patch))
            .await?;

        Ok(Response::new(serialize_reservation(&reservation)))
    }

    async fn transition_reservation(
        &self,
        request: Request<TransitionReservationPayload>,
    ) -> Result<Response<Reservation>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let reservation_id = parse_uuid(&payload.reservation_id, "reservation_id")?;
        let status = payload
            .status
            .map(reservation_service::ReservationStatus::try_from)
            .transpose()
            .map_err(|_| Status::invalid_argument("Invalid status"))?
            .map(ReservationStatus::from);
        let update = OwnerUpdate {
            status,
            internal_note: payload.internal_note,
            assigned_table_id: payload.assigned_table_id,
        };

        let reservation = self
            .run(move |m| m.transition(&actor, reservation_id, update))
            .await?;

        Ok(Response::new(serialize_reservation(&reservation)))
    }
}

pub struct SubmissionServiceImpl<C> {
    config: Arc<Config>,
    clock: Arc<C>,
}

impl<C: Clock + 'static> SubmissionServiceImpl<C> {
    pub fn new(config: Arc<Config>, clock: Arc<C>) -> Self {
        Self { config, clock }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, Status>
    where
        T: Send + 'static,
        F: FnOnce(&mut SubmissionWorkflow<'_, C>) -> Result<T, ServiceError> + Send + 'static,
    {
        let clock = self.clock.clone();
        with_connection(self.config.clone(), move |conn| {
            f(&mut SubmissionWorkflow::new(conn, clock.as_ref()))
        })
        .await
    }
}

#[tonic::async_trait]
impl<C: Clock + 'static> SubmissionService for SubmissionServiceImpl<C> {
    async fn create_submission(
        &self,
        request: Request<CreateSubmissionPayload>,
    ) -> Result<Response<Submission>, Status> {
        let payload = request.into_inner();
        let new_submission = NewSubmission {
            name: payload.name,
            address: payload.address,
            contact_email: payload.contact_email,
            submitted_by: payload
                .submitted_by
                .map(|uid| parse_uuid(&uid, "submitted_by"))
                .transpose()?,
        };

        let submission = self.run(move |w| w.create(new_submission)).await?;

        Ok(Response::new(serialize_submission(&submission)))
    }

    async fn get_submission(
        &self,
        request: Request<GetSubmissionPayload>,
    ) -> Result<Response<Submission>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let submission_id = parse_uuid(&payload.submission_id, "submission_id")?;

        let submission = self.run(move |w| w.get(&actor, submission_id)).await?;

        Ok(Response::new(serialize_submission(&submission)))
    }

    async fn transition_submission(
        &self,
        request: Request<TransitionSubmissionPayload>,
    ) -> Result<Response<TransitionSubmissionResponse>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let submission_id = parse_uuid(&payload.submission_id, "submission_id")?;
        let target = submission_service::SubmissionStatus::try_from(payload.target_status)
            .map(SubmissionStatus::from)
            .map_err(|_| Status::invalid_argument("Invalid target_status"))?;

        let result = self
            .run(move |w| w.transition(&actor, submission_id, target))
            .await?;

        Ok(Response::new(TransitionSubmissionResponse {
            submission: Some(serialize_submission(&result.submission)),
            applied: result.applied(),
            event: result.event.as_ref().map(serialize_submission_event),
        }))
    }

    async fn list_submission_events(
        &self,
        request: Request<ListSubmissionEventsPayload>,
    ) -> Result<Response<ListSubmissionEventsResponse>, Status> {
        let payload = request.into_inner();
        let actor = Actor::try_from(payload.actor)?;
        let submission_id = parse_uuid(&payload.submission_id, "submission_id")?;

        let events = self.run(move |w| w.events(&actor, submission_id)).await?;

        Ok(Response::new(ListSubmissionEventsResponse {
            events: events.iter().map(serialize_submission_event).collect(),
        }))
    }
}

pub async fn main(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = establish_connection(&config)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| -> Box<dyn std::error::Error> { err })?;

    let config = Arc::new(config);
    let clock = Arc::new(SystemClock);
    let addr = config.rpc_addr;

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ReservationServiceServer<ReservationServiceImpl<SystemClock>>>()
        .await;
    health_reporter
        .set_serving::<SubmissionServiceServer<SubmissionServiceImpl<SystemClock>>>()
        .await;

    info!(%addr, "listening");

    Server::builder()
        .add_service(health_service)
        .add_service(ReservationServiceServer::new(ReservationServiceImpl::new(
            config.clone(),
            clock.clone(),
        )))
        .add_service(SubmissionServiceServer::new(SubmissionServiceImpl::new(
            config, clock,
        )))
        .serve(addr)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablebook_proto::common;

    // Points at a port nothing listens on; every case below fails before
    // a connection is attempted.
    fn service() -> (
        ReservationServiceImpl<SystemClock>,
        SubmissionServiceImpl<SystemClock>,
    ) {
        let config = Arc::new(Config {
            database_url: "postgres://localhost:1/unused".to_string(),
            rpc_addr: "127.0.0.1:0".parse().unwrap(),
            kafka_url: None,
            statement_timeout_ms: 5000,
        });
        let clock = Arc::new(SystemClock);
        (
            ReservationServiceImpl::new(config.clone(), clock.clone()),
            SubmissionServiceImpl::new(config, clock),
        )
    }

    fn diner() -> Option<common::Actor> {
        Some(common::Actor {
            user_id: Uuid::new_v4().to_string(),
            role: common::Role::Diner as i32,
        })
    }

    #[tokio::test]
    async fn test_get_availability_invalid_id() {
        let (service, _) = service();
        let response = service
            .get_availability(Request::new(GetAvailabilityPayload {
                restaurant_id: "invalid_id".to_string(),
                date: "2024-06-01".to_string(),
                party_size: 2,
            }))
            .await;

        assert_eq!(response.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_create_reservation_invalid_time() {
        let (service, _) = service();
        let response = service
            .create_reservation(Request::new(CreateReservationPayload {
                actor: diner(),
                restaurant_id: Uuid::new_v4().to_string(),
                date: "2024-06-01".to_string(),
                time: "7pm".to_string(),
                party_size: 2,
                special_requests: None,
                occasion: None,
            }))
            .await;

        assert_eq!(response.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_missing_actor_is_rejected() {
        let (service, _) = service();
        let response = service
            .cancel_reservation(Request::new(CancelReservationPayload {
                actor: None,
                reservation_id: Uuid::new_v4().to_string(),
            }))
            .await;

        assert_eq!(response.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_transition_submission_unknown_status() {
        let (_, service) = service();
        let response = service
            .transition_submission(Request::new(TransitionSubmissionPayload {
                actor: diner(),
                submission_id: Uuid::new_v4().to_string(),
                target_status: 99,
            }))
            .await;

        assert_eq!(response.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_update_settings_requires_settings() {
        let (service, _) = service();
        let response = service
            .update_availability_settings(Request::new(UpdateAvailabilitySettingsPayload {
                actor: diner(),
                settings: None,
            }))
            .await;

        assert_eq!(response.unwrap_err().code(), tonic::Code::InvalidArgument);
    }
}
