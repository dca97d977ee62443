use std::io::Write;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
};
use uuid::Uuid;

use crate::schema::{
    availability_settings, opening_hours, outbox, reservations, restaurant_submissions,
    restaurants, submission_events,
};

#[derive(FromSqlRow, AsExpression, PartialEq, Eq, Copy, Clone, Debug)]
#[diesel(sql_type = crate::schema::sql_types::ReservationStatus)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Seated,
    Completed,
    Cancelled,
    NoShow,
}

impl ToSql<crate::schema::sql_types::ReservationStatus, Pg> for ReservationStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::ReservationStatus, Pg> for ReservationStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(ReservationStatus::Pending),
            b"confirmed" => Ok(ReservationStatus::Confirmed),
            b"seated" => Ok(ReservationStatus::Seated),
            b"completed" => Ok(ReservationStatus::Completed),
            b"cancelled" => Ok(ReservationStatus::Cancelled),
            b"no_show" => Ok(ReservationStatus::NoShow),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Seated => "seated",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::NoShow => "no_show",
        }
    }
}

impl From<tablebook_proto::reservation_service::ReservationStatus> for ReservationStatus {
    fn from(s: tablebook_proto::reservation_service::ReservationStatus) -> Self {
        use tablebook_proto::reservation_service::ReservationStatus as Proto;
        match s {
            Proto::Pending => ReservationStatus::Pending,
            Proto::Confirmed => ReservationStatus::Confirmed,
            Proto::Seated => ReservationStatus::Seated,
            Proto::Completed => ReservationStatus::Completed,
            Proto::Cancelled => ReservationStatus::Cancelled,
            Proto::NoShow => ReservationStatus::NoShow,
        }
    }
}

impl From<ReservationStatus> for tablebook_proto::reservation_service::ReservationStatus {
    fn from(s: ReservationStatus) -> Self {
        use tablebook_proto::reservation_service::ReservationStatus as Proto;
        match s {
            ReservationStatus::Pending => Proto::Pending,
            ReservationStatus::Confirmed => Proto::Confirmed,
            ReservationStatus::Seated => Proto::Seated,
            ReservationStatus::Completed => Proto::Completed,
            ReservationStatus::Cancelled => Proto::Cancelled,
            ReservationStatus::NoShow => Proto::NoShow,
        }
    }
}

#[derive(FromSqlRow, AsExpression, PartialEq, Eq, Copy, Clone, Debug)]
#[diesel(sql_type = crate::schema::sql_types::SubmissionStatus)]
pub enum SubmissionStatus {
    Submitted,
    UnderReview,
    OwnerInvited,
    Verified,
    Approved,
    Rejected,
}

impl ToSql<crate::schema::sql_types::SubmissionStatus, Pg> for SubmissionStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::SubmissionStatus, Pg> for SubmissionStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"submitted" => Ok(SubmissionStatus::Submitted),
            b"under_review" => Ok(SubmissionStatus::UnderReview),
            b"owner_invited" => Ok(SubmissionStatus::OwnerInvited),
            b"verified" => Ok(SubmissionStatus::Verified),
            b"approved" => Ok(SubmissionStatus::Approved),
            b"rejected" => Ok(SubmissionStatus::Rejected),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::UnderReview => "under_review",
            SubmissionStatus::OwnerInvited => "owner_invited",
            SubmissionStatus::Verified => "verified",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl From<tablebook_proto::submission_service::SubmissionStatus> for SubmissionStatus {
    fn from(s: tablebook_proto::submission_service::SubmissionStatus) -> Self {
        use tablebook_proto::submission_service::SubmissionStatus as Proto;
        match s {
            Proto::Submitted => SubmissionStatus::Submitted,
            Proto::UnderReview => SubmissionStatus::UnderReview,
            Proto::OwnerInvited => SubmissionStatus::OwnerInvited,
            Proto::Verified => SubmissionStatus::Verified,
            Proto::Approved => SubmissionStatus::Approved,
            Proto::Rejected => SubmissionStatus::Rejected,
        }
    }
}

impl From<SubmissionStatus> for tablebook_proto::submission_service::SubmissionStatus {
    fn from(s: SubmissionStatus) -> Self {
        use tablebook_proto::submission_service::SubmissionStatus as Proto;
        match s {
            SubmissionStatus::Submitted => Proto::Submitted,
            SubmissionStatus::UnderReview => Proto::UnderReview,
            SubmissionStatus::OwnerInvited => Proto::OwnerInvited,
            SubmissionStatus::Verified => Proto::Verified,
            SubmissionStatus::Approved => Proto::Approved,
            SubmissionStatus::Rejected => Proto::Rejected,
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, PartialEq, Clone)]
#[diesel(table_name = restaurants)]
pub struct Restaurant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub owner_id: Uuid,
    pub is_active: bool,
    pub utc_offset_minutes: i32,
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Insertable, AsChangeset, Debug, PartialEq,
)]
#[diesel(belongs_to(Restaurant))]
#[diesel(table_name = availability_settings, primary_key(restaurant_id))]
pub struct AvailabilitySetting {
    pub restaurant_id: Uuid,
    pub slot_duration_minutes: i32,
    pub buffer_minutes: i32,
    pub max_party_size: i32,
    pub advance_booking_days: i32,
    pub same_day_cutoff_hours: i32,
    pub cancellation_cutoff_hours: i32,
    pub online_reservations_enabled: bool,
    pub table_count: i32,
    pub seats_per_table: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Insertable, Debug, PartialEq)]
#[diesel(belongs_to(Restaurant))]
#[diesel(table_name = opening_hours, primary_key(restaurant_id, weekday))]
pub struct OpeningHour {
    pub restaurant_id: Uuid,
    pub weekday: i16,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Insertable, Debug, PartialEq, Clone,
)]
#[diesel(belongs_to(Restaurant))]
#[diesel(table_name = reservations)]
pub struct Reservation {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub user_id: Uuid,
    pub reservation_date: NaiveDate,
    pub reservation_time: NaiveTime,
    pub party_size: i32,
    pub status: ReservationStatus,
    pub assigned_table_id: Option<String>,
    pub internal_note: Option<String>,
    pub special_requests: Option<String>,
    pub occasion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a reservation row; `None` fields are left untouched.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = reservations)]
pub struct ReservationChangeset {
    pub reservation_date: Option<NaiveDate>,
    pub reservation_time: Option<NaiveTime>,
    pub party_size: Option<i32>,
    pub status: Option<ReservationStatus>,
    pub assigned_table_id: Option<String>,
    pub internal_note: Option<String>,
    pub special_requests: Option<String>,
    pub occasion: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Queryable, Selectable, Identifiable, Insertable, Debug, PartialEq, Clone)]
#[diesel(table_name = restaurant_submissions)]
pub struct RestaurantSubmission {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub contact_email: String,
    pub submitted_by: Option<Uuid>,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Insertable, Debug, PartialEq)]
#[diesel(belongs_to(RestaurantSubmission, foreign_key = submission_id))]
#[diesel(table_name = submission_events)]
pub struct SubmissionEvent {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub event: String,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Debug, PartialEq)]
#[diesel(table_name = outbox)]
pub struct Outbox {
    pub id: i32,
    pub topic: String,
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Insertable, Debug, PartialEq)]
#[diesel(table_name = outbox)]
pub struct NewOutbox {
    pub topic: String,
    pub key: String,
    pub value: Vec<u8>,
}
