//! Slot availability calculation.
//!
//! Everything here is pure: the caller supplies the schedule, the live
//! reservations for the requested date and the restaurant-local "now". The
//! result is advisory; bookings re-run [`remaining_tables`] under a lock
//! before inserting.

use std::fmt;

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::clock::can_modify;
use crate::error::ServiceError;

/// Parties of this size or larger are reported as one "large party" bucket.
pub const LARGE_PARTY_SIZE: u32 = 20;

pub const MAX_ADVANCE_BOOKING_DAYS: u32 = 365;
pub const MAX_CUTOFF_HOURS: u32 = 24 * 30;
const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningHours {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    /// Indexed by days from Monday; `None` means closed.
    pub weekly_hours: [Option<OpeningHours>; 7],
    pub slot_duration_minutes: u32,
    pub buffer_minutes: u32,
    pub max_party_size: u32,
    pub advance_booking_days: u32,
    pub same_day_cutoff_hours: u32,
    pub cancellation_cutoff_hours: u32,
    pub online_reservations_enabled: bool,
    pub table_count: u32,
    pub seats_per_table: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        let hours = OpeningHours {
            opens_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            closes_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
        };
        Self {
            weekly_hours: [Some(hours); 7],
            slot_duration_minutes: 90,
            buffer_minutes: 15,
            max_party_size: LARGE_PARTY_SIZE,
            advance_booking_days: 30,
            same_day_cutoff_hours: 2,
            cancellation_cutoff_hours: 2,
            online_reservations_enabled: true,
            table_count: 10,
            seats_per_table: 4,
        }
    }
}

impl Schedule {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.slot_duration_minutes == 0 {
            return Err(ServiceError::validation("Slot duration must be positive"));
        }
        if self.seats_per_table == 0 {
            return Err(ServiceError::validation("Seats per table must be positive"));
        }
        if self.max_party_size == 0 {
            return Err(ServiceError::validation("Max party size must be positive"));
        }
        if self.slot_duration_minutes > MINUTES_PER_DAY || self.buffer_minutes > MINUTES_PER_DAY {
            return Err(ServiceError::validation(
                "Slot duration and buffer must not exceed one day",
            ));
        }
        if self.advance_booking_days > MAX_ADVANCE_BOOKING_DAYS {
            return Err(ServiceError::validation(format!(
                "Advance booking window must not exceed {MAX_ADVANCE_BOOKING_DAYS} days"
            )));
        }
        if self.same_day_cutoff_hours > MAX_CUTOFF_HOURS
            || self.cancellation_cutoff_hours > MAX_CUTOFF_HOURS
        {
            return Err(ServiceError::validation(format!(
                "Cutoffs must not exceed {MAX_CUTOFF_HOURS} hours"
            )));
        }
        if self
            .weekly_hours
            .iter()
            .flatten()
            .any(|h| h.closes_at <= h.opens_at)
        {
            return Err(ServiceError::validation(
                "Closing time must be after opening time",
            ));
        }
        Ok(())
    }

    pub fn hours_on(&self, date: NaiveDate) -> Option<OpeningHours> {
        self.weekly_hours[date.weekday().num_days_from_monday() as usize]
    }

    /// Tables a party occupies; every party occupies at least one.
    pub fn tables_needed(&self, party_size: u32) -> u32 {
        party_size.div_ceil(self.seats_per_table.max(1)).max(1)
    }

    /// Candidate start times from opening up to `close - slot_duration`.
    pub fn slot_starts(&self, date: NaiveDate) -> Vec<NaiveTime> {
        let Some(hours) = self.hours_on(date) else {
            return Vec::new();
        };
        let step = i64::from(self.slot_duration_minutes);
        if step == 0 {
            return Vec::new();
        }
        let last = minutes_of(hours.closes_at) - step;

        let mut starts = Vec::new();
        let mut minute = minutes_of(hours.opens_at);
        while minute <= last {
            starts.push(hours.opens_at + Duration::minutes(minute - minutes_of(hours.opens_at)));
            minute += step;
        }
        starts
    }

    /// Two seatings conflict when their occupancy windows
    /// (`[start, start + slot + buffer)`) overlap by more than the buffer.
    fn conflicts(&self, a: NaiveTime, b: NaiveTime) -> bool {
        let window = i64::from(self.slot_duration_minutes + self.buffer_minutes);
        let (a, b) = (minutes_of(a), minutes_of(b));
        let overlap = (a + window).min(b + window) - a.max(b);
        overlap > i64::from(self.buffer_minutes)
    }
}

/// A live reservation as seen by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Booking {
    pub time: NaiveTime,
    pub party_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Available,
    Limited,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub time: NaiveTime,
    pub available_tables: u32,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyBucket {
    Standard(u32),
    Large,
}

impl PartyBucket {
    pub fn of(party_size: u32) -> Self {
        if party_size >= LARGE_PARTY_SIZE {
            PartyBucket::Large
        } else {
            PartyBucket::Standard(party_size)
        }
    }
}

impl fmt::Display for PartyBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyBucket::Standard(n) => write!(f, "{n}"),
            PartyBucket::Large => write!(f, "{LARGE_PARTY_SIZE}+"),
        }
    }
}

/// Rejects party sizes and dates the restaurant does not take online.
pub fn validate_request(
    schedule: &Schedule,
    date: NaiveDate,
    party_size: u32,
    now: NaiveDateTime,
) -> Result<(), ServiceError> {
    if party_size < 1 {
        return Err(ServiceError::validation("Party size must be at least 1"));
    }
    if party_size > schedule.max_party_size {
        return Err(ServiceError::validation(format!(
            "Party size must not exceed {}",
            schedule.max_party_size
        )));
    }

    let today = now.date();
    let last_day = today
        .checked_add_days(Days::new(u64::from(schedule.advance_booking_days)))
        .ok_or_else(|| ServiceError::validation("Advance booking window is out of range"))?;
    if date < today || date > last_day {
        return Err(ServiceError::validation(format!(
            "Date must be between {} and {}",
            today, last_day
        )));
    }
    Ok(())
}

/// Tables left at `time` after subtracting every conflicting booking.
pub fn remaining_tables(schedule: &Schedule, time: NaiveTime, bookings: &[Booking]) -> u32 {
    let consumed: u32 = bookings
        .iter()
        .filter(|b| schedule.conflicts(time, b.time))
        .map(|b| schedule.tables_needed(b.party_size))
        .sum();
    schedule.table_count.saturating_sub(consumed)
}

/// Whether `time` is a slot start on `date` that is still outside the
/// same-day cutoff.
pub fn is_bookable_start(
    schedule: &Schedule,
    date: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> bool {
    schedule.slot_starts(date).contains(&time)
        && clears_same_day_cutoff(schedule, date, time, now)
}

/// The cutoff only applies to slots on the current local date.
fn clears_same_day_cutoff(
    schedule: &Schedule,
    date: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> bool {
    date != now.date() || can_modify(date, time, schedule.same_day_cutoff_hours, now)
}

fn slot_status(schedule: &Schedule, remaining: u32, needed: u32) -> SlotStatus {
    if remaining < needed {
        SlotStatus::Unavailable
    } else if remaining.saturating_mul(5) <= schedule.table_count {
        SlotStatus::Limited
    } else {
        SlotStatus::Available
    }
}

/// Computes the ordered slot list for `date`.
///
/// Returns no slots when online reservations are disabled or the restaurant
/// is closed that day.
pub fn compute_slots(
    schedule: &Schedule,
    date: NaiveDate,
    party_size: u32,
    bookings: &[Booking],
    now: NaiveDateTime,
) -> Result<Vec<Slot>, ServiceError> {
    if !schedule.online_reservations_enabled {
        return Ok(Vec::new());
    }
    validate_request(schedule, date, party_size, now)?;

    let starts = schedule.slot_starts(date);
    let open_starts: Vec<NaiveTime> = starts
        .iter()
        .copied()
        .filter(|t| clears_same_day_cutoff(schedule, date, *t, now))
        .collect();
    if !starts.is_empty() && open_starts.is_empty() {
        return Err(ServiceError::validation(
            "Online booking for this date has closed",
        ));
    }

    let needed = schedule.tables_needed(party_size);
    Ok(open_starts
        .into_iter()
        .map(|time| {
            let available_tables = remaining_tables(schedule, time, bookings);
            Slot {
                time,
                available_tables,
                status: slot_status(schedule, available_tables, needed),
            }
        })
        .collect())
}

fn minutes_of(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight() / 60)
}
