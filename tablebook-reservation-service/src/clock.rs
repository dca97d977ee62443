//! Calendar conversions and the modification window check.
//!
//! Reservations store a wall-clock date and time in the restaurant's local
//! convention. "Now" comes from a [`Clock`] and is shifted into that
//! convention with the restaurant's UTC offset before any comparison.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::ServiceError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Converts an absolute instant into the restaurant's local wall clock.
pub fn local_now(now: DateTime<Utc>, utc_offset_minutes: i32) -> Result<NaiveDateTime, ServiceError> {
    let offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| ServiceError::validation("Invalid restaurant UTC offset"))?;
    Ok(now.with_timezone(&offset).naive_local())
}

pub fn reservation_start(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// True iff `now + cutoff_hours` is strictly before the reservation start.
///
/// With a cutoff of 0 a reservation can be changed until, but not at, its
/// start instant.
pub fn can_modify(date: NaiveDate, time: NaiveTime, cutoff_hours: u32, now: NaiveDateTime) -> bool {
    now.checked_add_signed(Duration::hours(i64::from(cutoff_hours)))
        .is_some_and(|limit| limit < reservation_start(date, time))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ServiceError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| ServiceError::validation("Invalid date, expected YYYY-MM-DD"))
}

pub fn parse_time(value: &str) -> Result<NaiveTime, ServiceError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|_| ServiceError::validation("Invalid time, expected HH:mm"))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn evening() -> (NaiveDate, NaiveTime) {
        (
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_can_modify_boundary() {
        let (date, time) = evening();

        assert!(can_modify(date, time, 2, at("2024-06-02", "16:59:59")));
        assert!(!can_modify(date, time, 2, at("2024-06-02", "17:00:00")));
        assert!(!can_modify(date, time, 2, at("2024-06-02", "17:00:01")));
    }

    #[test]
    fn test_can_modify_rejects_inside_window() {
        let (date, time) = evening();

        assert!(!can_modify(date, time, 2, at("2024-06-02", "17:30:00")));
        assert!(can_modify(date, time, 2, at("2024-06-01", "17:30:00")));
    }

    #[test]
    fn test_zero_cutoff_allows_until_start() {
        let (date, time) = evening();

        assert!(can_modify(date, time, 0, at("2024-06-02", "18:59:59")));
        assert!(!can_modify(date, time, 0, at("2024-06-02", "19:00:00")));
    }

    #[test]
    fn test_cutoff_past_calendar_never_allows() {
        let (date, time) = evening();

        assert!(!can_modify(date, time, u32::MAX, at("2024-06-01", "17:30:00")));
    }

    #[test]
    fn test_local_now_applies_offset() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(local_now(now, 120).unwrap(), at("2024-06-02", "01:30:00"));
        assert_eq!(local_now(now, -300).unwrap(), at("2024-06-01", "18:30:00"));
        assert!(local_now(now, 24 * 60).is_err());
    }

    #[test]
    fn test_parse_and_format() {
        let date = parse_date("2024-06-01").unwrap();
        let time = parse_time("09:30").unwrap();

        assert_eq!(format_date(date), "2024-06-01");
        assert_eq!(format_time(time), "09:30");
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_time("9.30").is_err());
    }
}
