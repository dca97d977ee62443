use diesel::{prelude::*, PgConnection};
use prost::Message;
use tablebook_proto::reservation_service::{
    reservation_event, ReservationCreatedEvent, ReservationDetails, ReservationEvent,
    ReservationModifiedEvent, ReservationStatusChangedEvent,
};

use crate::availability::PartyBucket;
use crate::clock::{format_date, format_time};
use crate::models::{self, NewOutbox, ReservationStatus};
use crate::{schema, EVENT_CHANNEL};

/// Writes reservation events to the outbox on the caller's connection, so
/// they commit or roll back with the surrounding transaction.
pub struct ReservationEventPublisher<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> ReservationEventPublisher<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    pub fn reservation_created(
        &mut self,
        reservation: &models::Reservation,
        restaurant: &models::Restaurant,
    ) -> QueryResult<()> {
        let event = reservation_event::Event::ReservationCreated(ReservationCreatedEvent {
            id: reservation.id.to_string(),
            details: Some(details(reservation, restaurant)),
        });
        self.publish(reservation, event)
    }

    pub fn reservation_status_changed(
        &mut self,
        reservation: &models::Reservation,
        restaurant: &models::Restaurant,
        previous_status: ReservationStatus,
    ) -> QueryResult<()> {
        let previous: tablebook_proto::reservation_service::ReservationStatus =
            previous_status.into();
        let current: tablebook_proto::reservation_service::ReservationStatus =
            reservation.status.into();
        let event =
            reservation_event::Event::ReservationStatusChanged(ReservationStatusChangedEvent {
                id: reservation.id.to_string(),
                previous_status: previous.into(),
                status: current.into(),
                details: Some(details(reservation, restaurant)),
            });
        self.publish(reservation, event)
    }

    pub fn reservation_modified(
        &mut self,
        reservation: &models::Reservation,
        restaurant: &models::Restaurant,
    ) -> QueryResult<()> {
        let event = reservation_event::Event::ReservationModified(ReservationModifiedEvent {
            id: reservation.id.to_string(),
            details: Some(details(reservation, restaurant)),
        });
        self.publish(reservation, event)
    }

    // Keyed by restaurant so a consumer sees one restaurant's events in order.
    fn publish(
        &mut self,
        reservation: &models::Reservation,
        event: reservation_event::Event,
    ) -> QueryResult<()> {
        let value = ReservationEvent { event: Some(event) }.encode_to_vec();

        diesel::insert_into(schema::outbox::table)
            .values(NewOutbox {
                topic: EVENT_CHANNEL.to_string(),
                key: reservation.restaurant_id.to_string(),
                value,
            })
            .execute(self.conn)?;
        Ok(())
    }
}

fn details(
    reservation: &models::Reservation,
    restaurant: &models::Restaurant,
) -> ReservationDetails {
    let party_size = u32::try_from(reservation.party_size).unwrap_or_default();
    ReservationDetails {
        restaurant_id: restaurant.id.to_string(),
        restaurant_name: restaurant.name.clone(),
        user_id: reservation.user_id.to_string(),
        date: format_date(reservation.reservation_date),
        time: format_time(reservation.reservation_time),
        party_size,
        party_size_label: PartyBucket::of(party_size).to_string(),
    }
}
