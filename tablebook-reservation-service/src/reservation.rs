//! Reservation lifecycle backed by PostgreSQL.
//!
//! Every booking that consumes capacity (create, or a modify that moves the
//! slot) locks the restaurant row first, then re-reads live reservations and
//! re-checks remaining tables inside the same transaction. Status changes are
//! conditional on the status that was read, so a lost race surfaces as
//! [`ServiceError::InvalidTransition`] instead of overwriting.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use diesel::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::authz::{authorize, Actor, Capability, Role};
use crate::availability::{self, Booking, OpeningHours, Schedule, Slot};
use crate::clock::{can_modify, local_now, Clock};
use crate::error::ServiceError;
use crate::events::ReservationEventPublisher;
use crate::lifecycle::TransitionOutcome;
use crate::models::{
    AvailabilitySetting, OpeningHour, Reservation, ReservationChangeset, ReservationStatus,
    Restaurant,
};
use crate::schema::{availability_settings, opening_hours, reservations, restaurants};

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub restaurant_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub party_size: u32,
    pub special_requests: Option<String>,
    pub occasion: Option<String>,
}

/// Diner-side changes; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ReservationPatch {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub party_size: Option<u32>,
    pub special_requests: Option<String>,
    pub occasion: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OwnerUpdate {
    pub status: Option<ReservationStatus>,
    pub internal_note: Option<String>,
    pub assigned_table_id: Option<String>,
}

pub struct ReservationManager<'a, C: Clock> {
    conn: &'a mut PgConnection,
    clock: &'a C,
}

impl<'a, C: Clock> ReservationManager<'a, C> {
    pub fn new(conn: &'a mut PgConnection, clock: &'a C) -> Self {
        Self { conn, clock }
    }

    /// Advisory slot list; an inactive restaurant offers nothing.
    pub fn availability(
        &mut self,
        restaurant_id: Uuid,
        date: NaiveDate,
        party_size: u32,
    ) -> Result<Vec<Slot>, ServiceError> {
        let restaurant = find_restaurant(self.conn, restaurant_id)?;
        if !restaurant.is_active {
            return Ok(Vec::new());
        }
        let schedule = load_schedule(self.conn, restaurant.id)?;
        let now = local_now(self.clock.now(), restaurant.utc_offset_minutes)?;
        let bookings = live_bookings(self.conn, restaurant.id, date, None)?;

        availability::compute_slots(&schedule, date, party_size, &bookings, now)
    }

    pub fn settings(&mut self, restaurant_id: Uuid) -> Result<Schedule, ServiceError> {
        let restaurant = find_restaurant(self.conn, restaurant_id)?;
        Ok(load_schedule(self.conn, restaurant.id)?)
    }

    /// Creates or replaces the restaurant's schedule, opening hours included.
    pub fn update_settings(
        &mut self,
        actor: &Actor,
        restaurant_id: Uuid,
        schedule: Schedule,
    ) -> Result<Schedule, ServiceError> {
        let updated_at = self.clock.now();

        self.conn.transaction::<_, ServiceError, _>(|conn| {
            let restaurant = lock_restaurant(conn, restaurant_id)?;
            authorize(actor, Capability::OwnerOf(&restaurant))?;
            schedule.validate()?;

            let (setting, hours) = schedule_rows(restaurant.id, &schedule, updated_at)?;
            diesel::insert_into(availability_settings::table)
                .values(&setting)
                .on_conflict(availability_settings::restaurant_id)
                .do_update()
                .set(&setting)
                .execute(conn)?;
            diesel::delete(
                opening_hours::table.filter(opening_hours::restaurant_id.eq(restaurant.id)),
            )
            .execute(conn)?;
            if !hours.is_empty() {
                diesel::insert_into(opening_hours::table)
                    .values(&hours)
                    .execute(conn)?;
            }

            info!(restaurant_id = %restaurant.id, actor_id = %actor.user_id, "availability settings updated");
            Ok(())
        })?;

        Ok(schedule)
    }

    pub fn create(
        &mut self,
        actor: &Actor,
        request: NewReservation,
    ) -> Result<Reservation, ServiceError> {
        authorize(actor, Capability::Diner)?;
        let clock = self.clock;

        self.conn.transaction::<_, ServiceError, _>(|conn| {
            let restaurant = lock_restaurant(conn, request.restaurant_id)?;
            let schedule = load_schedule(conn, restaurant.id)?;
            ensure_accepting(&restaurant, &schedule)?;

            let now = local_now(clock.now(), restaurant.utc_offset_minutes)?;
            ensure_bookable(&schedule, request.date, request.time, request.party_size, now)?;
            let bookings = live_bookings(conn, restaurant.id, request.date, None)?;
            ensure_capacity(
                &schedule,
                restaurant.id,
                request.date,
                request.time,
                request.party_size,
                &bookings,
            )?;

            let created_at = clock.now();
            let reservation = Reservation {
                id: Uuid::new_v4(),
                restaurant_id: restaurant.id,
                user_id: actor.user_id,
                reservation_date: request.date,
                reservation_time: request.time,
                party_size: stored(request.party_size)?,
                status: ReservationStatus::Pending,
                assigned_table_id: None,
                internal_note: None,
                special_requests: request.special_requests,
                occasion: request.occasion,
                created_at,
                updated_at: created_at,
            };
            let reservation = diesel::insert_into(reservations::table)
                .values(&reservation)
                .returning(Reservation::as_returning())
                .get_result(conn)?;

            ReservationEventPublisher::new(conn).reservation_created(&reservation, &restaurant)?;

            info!(
                reservation_id = %reservation.id,
                restaurant_id = %restaurant.id,
                date = %reservation.reservation_date,
                time = %reservation.reservation_time,
                party_size = reservation.party_size,
                "reservation created"
            );
            Ok(reservation)
        })
    }

    pub fn get(&mut self, actor: &Actor, reservation_id: Uuid) -> Result<Reservation, ServiceError> {
        let reservation = find_reservation(self.conn, reservation_id)?;
        match actor.role {
            Role::Diner => authorize(actor, Capability::DinerOwnsReservation(&reservation))?,
            Role::RestaurantOwner | Role::Admin => {
                let restaurant = find_restaurant(self.conn, reservation.restaurant_id)?;
                authorize(actor, Capability::OwnerOf(&restaurant))?;
            }
        }
        Ok(reservation)
    }

    /// Diners see their own reservations; owners must name their restaurant.
    pub fn list(
        &mut self,
        actor: &Actor,
        restaurant_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Reservation>, ServiceError> {
        let mut query = reservations::table
            .select(Reservation::as_select())
            .into_boxed();

        match actor.role {
            Role::Diner => {
                query = query.filter(reservations::user_id.eq(actor.user_id));
                if let Some(rid) = restaurant_id {
                    query = query.filter(reservations::restaurant_id.eq(rid));
                }
            }
            Role::RestaurantOwner | Role::Admin => {
                let rid = restaurant_id
                    .ok_or_else(|| ServiceError::validation("restaurant_id must be set"))?;
                let restaurant = find_restaurant(self.conn, rid)?;
                authorize(actor, Capability::OwnerOf(&restaurant))?;
                query = query.filter(reservations::restaurant_id.eq(restaurant.id));
            }
        }
        if let Some(d) = date {
            query = query.filter(reservations::reservation_date.eq(d));
        }

        Ok(query
            .order_by((
                reservations::reservation_date.asc(),
                reservations::reservation_time.asc(),
                reservations::created_at.asc(),
            ))
            .load(self.conn)?)
    }

    pub fn cancel(
        &mut self,
        actor: &Actor,
        reservation_id: Uuid,
    ) -> Result<Reservation, ServiceError> {
        let clock = self.clock;

        self.conn.transaction::<_, ServiceError, _>(|conn| {
            let reservation = lock_reservation(conn, reservation_id)?;
            authorize(actor, Capability::DinerOwnsReservation(&reservation))?;
            reservation.status.transition(ReservationStatus::Cancelled)?;

            let restaurant = find_restaurant(conn, reservation.restaurant_id)?;
            let schedule = load_schedule(conn, restaurant.id)?;
            let now = local_now(clock.now(), restaurant.utc_offset_minutes)?;
            ensure_before_cutoff(&reservation, schedule.cancellation_cutoff_hours, now)?;

            let cancelled = update_if_unchanged(
                conn,
                &reservation,
                ReservationStatus::Cancelled,
                ReservationChangeset {
                    status: Some(ReservationStatus::Cancelled),
                    updated_at: Some(clock.now()),
                    ..Default::default()
                },
            )?;
            ReservationEventPublisher::new(conn).reservation_status_changed(
                &cancelled,
                &restaurant,
                reservation.status,
            )?;

            info!(reservation_id = %cancelled.id, from = reservation.status.as_str(), "reservation cancelled by diner");
            Ok(cancelled)
        })
    }

    /// Moves a pending or confirmed reservation while it is still outside
    /// the cancellation cutoff. A new slot is capacity-checked without
    /// counting the reservation itself.
    pub fn modify(
        &mut self,
        actor: &Actor,
        reservation_id: Uuid,
        patch: ReservationPatch,
    ) -> Result<Reservation, ServiceError> {
        let clock = self.clock;

        self.conn.transaction::<_, ServiceError, _>(|conn| {
            let reservation = lock_reservation(conn, reservation_id)?;
            authorize(actor, Capability::DinerOwnsReservation(&reservation))?;
            if reservation.status.is_terminal() {
                return Err(ServiceError::TerminalState(reservation.status));
            }
            if !reservation.status.is_modifiable() {
                return Err(ServiceError::validation(
                    "Only pending or confirmed reservations can be modified",
                ));
            }

            let restaurant = lock_restaurant(conn, reservation.restaurant_id)?;
            let schedule = load_schedule(conn, restaurant.id)?;
            let now = local_now(clock.now(), restaurant.utc_offset_minutes)?;
            ensure_before_cutoff(&reservation, schedule.cancellation_cutoff_hours, now)?;

            let date = patch.date.unwrap_or(reservation.reservation_date);
            let time = patch.time.unwrap_or(reservation.reservation_time);
            let party_size = match patch.party_size {
                Some(size) => size,
                None => u32::try_from(reservation.party_size).unwrap_or_default(),
            };
            let party_size_value = stored(party_size)?;

            let moved = date != reservation.reservation_date
                || time != reservation.reservation_time
                || party_size_value != reservation.party_size;
            if moved {
                ensure_accepting(&restaurant, &schedule)?;
                ensure_bookable(&schedule, date, time, party_size, now)?;
                let bookings = live_bookings(conn, restaurant.id, date, Some(reservation.id))?;
                ensure_capacity(&schedule, restaurant.id, date, time, party_size, &bookings)?;
            }

            let modified = update_if_unchanged(
                conn,
                &reservation,
                reservation.status,
                ReservationChangeset {
                    reservation_date: Some(date),
                    reservation_time: Some(time),
                    party_size: Some(party_size_value),
                    special_requests: patch.special_requests,
                    occasion: patch.occasion,
                    updated_at: Some(clock.now()),
                    ..Default::default()
                },
            )?;
            ReservationEventPublisher::new(conn).reservation_modified(&modified, &restaurant)?;

            info!(reservation_id = %modified.id, moved, "reservation modified");
            Ok(modified)
        })
    }

    /// Owner-side status change, optionally with a note or table assignment.
    pub fn transition(
        &mut self,
        actor: &Actor,
        reservation_id: Uuid,
        update: OwnerUpdate,
    ) -> Result<Reservation, ServiceError> {
        let clock = self.clock;

        self.conn.transaction::<_, ServiceError, _>(|conn| {
            let reservation = find_reservation(conn, reservation_id)?;
            let restaurant = find_restaurant(conn, reservation.restaurant_id)?;
            authorize(actor, Capability::OwnerOf(&restaurant))?;

            let target = update.status.unwrap_or(reservation.status);
            let outcome = match update.status {
                Some(status) => reservation.status.transition(status)?,
                None => TransitionOutcome::Unchanged,
            };
            if outcome == TransitionOutcome::Unchanged
                && update.internal_note.is_none()
                && update.assigned_table_id.is_none()
            {
                return Ok(reservation);
            }

            let updated = update_if_unchanged(
                conn,
                &reservation,
                target,
                ReservationChangeset {
                    status: (outcome == TransitionOutcome::Applied).then_some(target),
                    internal_note: update.internal_note,
                    assigned_table_id: update.assigned_table_id,
                    updated_at: Some(clock.now()),
                    ..Default::default()
                },
            )?;

            if outcome == TransitionOutcome::Applied {
                ReservationEventPublisher::new(conn).reservation_status_changed(
                    &updated,
                    &restaurant,
                    reservation.status,
                )?;
                info!(
                    reservation_id = %updated.id,
                    actor_id = %actor.user_id,
                    from = reservation.status.as_str(),
                    to = updated.status.as_str(),
                    "reservation status changed"
                );
            }
            Ok(updated)
        })
    }
}

fn find_restaurant(conn: &mut PgConnection, restaurant_id: Uuid) -> QueryResult<Restaurant> {
    restaurants::table
        .find(restaurant_id)
        .select(Restaurant::as_select())
        .first(conn)
}

// Serializes every capacity decision for one restaurant.
fn lock_restaurant(conn: &mut PgConnection, restaurant_id: Uuid) -> QueryResult<Restaurant> {
    restaurants::table
        .find(restaurant_id)
        .select(Restaurant::as_select())
        .for_update()
        .first(conn)
}

fn find_reservation(conn: &mut PgConnection, reservation_id: Uuid) -> QueryResult<Reservation> {
    reservations::table
        .find(reservation_id)
        .select(Reservation::as_select())
        .first(conn)
}

fn lock_reservation(conn: &mut PgConnection, reservation_id: Uuid) -> QueryResult<Reservation> {
    reservations::table
        .find(reservation_id)
        .select(Reservation::as_select())
        .for_update()
        .first(conn)
}

/// Stored settings, or the defaults when the owner never configured any.
fn load_schedule(conn: &mut PgConnection, restaurant_id: Uuid) -> QueryResult<Schedule> {
    let Some(setting) = availability_settings::table
        .find(restaurant_id)
        .select(AvailabilitySetting::as_select())
        .first(conn)
        .optional()?
    else {
        return Ok(Schedule::default());
    };
    let hours = opening_hours::table
        .filter(opening_hours::restaurant_id.eq(restaurant_id))
        .select(OpeningHour::as_select())
        .load(conn)?;

    Ok(schedule_from_rows(&setting, &hours))
}

fn live_bookings(
    conn: &mut PgConnection,
    restaurant_id: Uuid,
    date: NaiveDate,
    excluding: Option<Uuid>,
) -> QueryResult<Vec<Booking>> {
    let mut query = reservations::table
        .filter(reservations::restaurant_id.eq(restaurant_id))
        .filter(reservations::reservation_date.eq(date))
        .filter(reservations::status.eq_any(ReservationStatus::LIVE))
        .select((reservations::reservation_time, reservations::party_size))
        .into_boxed();
    if let Some(id) = excluding {
        query = query.filter(reservations::id.ne(id));
    }

    let rows: Vec<(NaiveTime, i32)> = query.load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(time, party_size)| Booking {
            time,
            party_size: u32::try_from(party_size).unwrap_or_default(),
        })
        .collect())
}

/// Applies `changes` only if the row still has the status that was read.
fn update_if_unchanged(
    conn: &mut PgConnection,
    reservation: &Reservation,
    target: ReservationStatus,
    changes: ReservationChangeset,
) -> Result<Reservation, ServiceError> {
    diesel::update(
        reservations::table
            .filter(reservations::id.eq(reservation.id))
            .filter(reservations::status.eq(reservation.status)),
    )
    .set(&changes)
    .returning(Reservation::as_returning())
    .get_result(conn)
    .optional()?
    .ok_or(ServiceError::InvalidTransition {
        from: reservation.status,
        to: target,
    })
}

fn ensure_accepting(restaurant: &Restaurant, schedule: &Schedule) -> Result<(), ServiceError> {
    if !restaurant.is_active || !schedule.online_reservations_enabled {
        return Err(ServiceError::validation(
            "Restaurant is not accepting online reservations",
        ));
    }
    Ok(())
}

fn ensure_bookable(
    schedule: &Schedule,
    date: NaiveDate,
    time: NaiveTime,
    party_size: u32,
    now: NaiveDateTime,
) -> Result<(), ServiceError> {
    availability::validate_request(schedule, date, party_size, now)?;
    if !availability::is_bookable_start(schedule, date, time, now) {
        return Err(ServiceError::validation(
            "Requested time is not a bookable slot",
        ));
    }
    Ok(())
}

fn ensure_capacity(
    schedule: &Schedule,
    restaurant_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
    party_size: u32,
    bookings: &[Booking],
) -> Result<(), ServiceError> {
    let remaining = availability::remaining_tables(schedule, time, bookings);
    if remaining < schedule.tables_needed(party_size) {
        warn!(
            restaurant_id = %restaurant_id,
            date = %date,
            time = %time,
            party_size,
            remaining,
            "slot capacity exhausted"
        );
        return Err(ServiceError::CapacityConflict);
    }
    Ok(())
}

fn ensure_before_cutoff(
    reservation: &Reservation,
    cutoff_hours: u32,
    now: NaiveDateTime,
) -> Result<(), ServiceError> {
    if !can_modify(
        reservation.reservation_date,
        reservation.reservation_time,
        cutoff_hours,
        now,
    ) {
        warn!(reservation_id = %reservation.id, cutoff_hours, "change requested inside cutoff window");
        return Err(ServiceError::CutoffViolation);
    }
    Ok(())
}

fn stored(value: u32) -> Result<i32, ServiceError> {
    i32::try_from(value).map_err(|_| ServiceError::validation("Value out of range"))
}

// Column CHECK constraints keep these non-negative.
fn unsigned(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

fn schedule_from_rows(setting: &AvailabilitySetting, hours: &[OpeningHour]) -> Schedule {
    let mut weekly_hours = [None; 7];
    for h in hours {
        if let Some(day) = usize::try_from(h.weekday)
            .ok()
            .and_then(|d| weekly_hours.get_mut(d))
        {
            *day = Some(OpeningHours {
                opens_at: h.opens_at,
                closes_at: h.closes_at,
            });
        }
    }

    Schedule {
        weekly_hours,
        slot_duration_minutes: unsigned(setting.slot_duration_minutes),
        buffer_minutes: unsigned(setting.buffer_minutes),
        max_party_size: unsigned(setting.max_party_size),
        advance_booking_days: unsigned(setting.advance_booking_days),
        same_day_cutoff_hours: unsigned(setting.same_day_cutoff_hours),
        cancellation_cutoff_hours: unsigned(setting.cancellation_cutoff_hours),
        online_reservations_enabled: setting.online_reservations_enabled,
        table_count: unsigned(setting.table_count),
        seats_per_table: unsigned(setting.seats_per_table),
    }
}

fn schedule_rows(
    restaurant_id: Uuid,
    schedule: &Schedule,
    updated_at: chrono::DateTime<chrono::Utc>,
) -> Result<(AvailabilitySetting, Vec<OpeningHour>), ServiceError> {
    let setting = AvailabilitySetting {
        restaurant_id,
        slot_duration_minutes: stored(schedule.slot_duration_minutes)?,
        buffer_minutes: stored(schedule.buffer_minutes)?,
        max_party_size: stored(schedule.max_party_size)?,
        advance_booking_days: stored(schedule.advance_booking_days)?,
        same_day_cutoff_hours: stored(schedule.same_day_cutoff_hours)?,
        cancellation_cutoff_hours: stored(schedule.cancellation_cutoff_hours)?,
        online_reservations_enabled: schedule.online_reservations_enabled,
        table_count: stored(schedule.table_count)?,
        seats_per_table: stored(schedule.seats_per_table)?,
        updated_at,
    };
    let hours = schedule
        .weekly_hours
        .iter()
        .enumerate()
        .filter_map(|(weekday, hours)| {
            hours.map(|h| OpeningHour {
                restaurant_id,
                weekday: weekday as i16,
                opens_at: h.opens_at,
                closes_at: h.closes_at,
            })
        })
        .collect();

    Ok((setting, hours))
}
