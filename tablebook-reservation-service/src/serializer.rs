use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use tablebook_proto::{reservation_service, submission_service};
use uuid::Uuid;

use crate::availability::{OpeningHours, Schedule, Slot, SlotStatus};
use crate::clock::{format_date, format_time, parse_time};
use crate::error::ServiceError;
use crate::models;

pub fn serialize_timestamp(t: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    }
}

pub fn serialize_reservation(r: &models::Reservation) -> reservation_service::Reservation {
    reservation_service::Reservation {
        id: r.id.to_string(),
        restaurant_id: r.restaurant_id.to_string(),
        user_id: r.user_id.to_string(),
        date: format_date(r.reservation_date),
        time: format_time(r.reservation_time),
        party_size: u32::try_from(r.party_size).unwrap_or_default(),
        status: reservation_service::ReservationStatus::from(r.status).into(),
        assigned_table_id: r.assigned_table_id.clone(),
        internal_note: r.internal_note.clone(),
        special_requests: r.special_requests.clone(),
        occasion: r.occasion.clone(),
        created_at: Some(serialize_timestamp(r.created_at)),
        updated_at: Some(serialize_timestamp(r.updated_at)),
    }
}

pub fn serialize_slot(slot: &Slot) -> reservation_service::Slot {
    let status = match slot.status {
        SlotStatus::Available => reservation_service::SlotStatus::Available,
        SlotStatus::Limited => reservation_service::SlotStatus::Limited,
        SlotStatus::Unavailable => reservation_service::SlotStatus::Unavailable,
    };
    reservation_service::Slot {
        time: format_time(slot.time),
        available_tables: slot.available_tables,
        status: status.into(),
    }
}

pub fn serialize_settings(
    restaurant_id: Uuid,
    schedule: &Schedule,
) -> reservation_service::AvailabilitySettings {
    reservation_service::AvailabilitySettings {
        restaurant_id: restaurant_id.to_string(),
        opening_hours: schedule
            .weekly_hours
            .iter()
            .enumerate()
            .filter_map(|(weekday, hours)| {
                hours.map(|h| reservation_service::OpeningHours {
                    weekday: weekday as u32,
                    opens_at: format_time(h.opens_at),
                    closes_at: format_time(h.closes_at),
                })
            })
            .collect(),
        slot_duration_minutes: schedule.slot_duration_minutes,
        buffer_minutes: schedule.buffer_minutes,
        max_party_size: schedule.max_party_size,
        advance_booking_days: schedule.advance_booking_days,
        same_day_cutoff_hours: schedule.same_day_cutoff_hours,
        cancellation_cutoff_hours: schedule.cancellation_cutoff_hours,
        online_reservations_enabled: schedule.online_reservations_enabled,
        table_count: schedule.table_count,
        seats_per_table: schedule.seats_per_table,
    }
}

/// Weekdays missing from `opening_hours` are closed.
pub fn deserialize_settings(
    settings: &reservation_service::AvailabilitySettings,
) -> Result<Schedule, ServiceError> {
    let mut weekly_hours = [None; 7];
    for h in &settings.opening_hours {
        let slot = weekly_hours
            .get_mut(h.weekday as usize)
            .ok_or_else(|| ServiceError::validation("Weekday must be between 0 and 6"))?;
        if slot.is_some() {
            return Err(ServiceError::validation(format!(
                "Opening hours for weekday {} given twice",
                h.weekday
            )));
        }
        *slot = Some(OpeningHours {
            opens_at: parse_time(&h.opens_at)?,
            closes_at: parse_time(&h.closes_at)?,
        });
    }

    let schedule = Schedule {
        weekly_hours,
        slot_duration_minutes: settings.slot_duration_minutes,
        buffer_minutes: settings.buffer_minutes,
        max_party_size: settings.max_party_size,
        advance_booking_days: settings.advance_booking_days,
        same_day_cutoff_hours: settings.same_day_cutoff_hours,
        cancellation_cutoff_hours: settings.cancellation_cutoff_hours,
        online_reservations_enabled: settings.online_reservations_enabled,
        table_count: settings.table_count,
        seats_per_table: settings.seats_per_table,
    };
    schedule.validate()?;
    Ok(schedule)
}

pub fn serialize_submission(s: &models::RestaurantSubmission) -> submission_service::Submission {
    submission_service::Submission {
        id: s.id.to_string(),
        name: s.name.clone(),
        address: s.address.clone(),
        contact_email: s.contact_email.clone(),
        submitted_by: s.submitted_by.map(|u| u.to_string()),
        status: submission_service::SubmissionStatus::from(s.status).into(),
        created_at: Some(serialize_timestamp(s.created_at)),
        updated_at: Some(serialize_timestamp(s.updated_at)),
    }
}

pub fn serialize_submission_event(
    e: &models::SubmissionEvent,
) -> submission_service::SubmissionEvent {
    submission_service::SubmissionEvent {
        id: e.id.to_string(),
        submission_id: e.submission_id.to_string(),
        event: e.event.clone(),
        actor_id: e.actor_id.to_string(),
        created_at: Some(serialize_timestamp(e.created_at)),
    }
}
