#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::{sql_query, PgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tablebook_reservation_service::authz::{Actor, Role};
use tablebook_reservation_service::clock::FixedClock;
use tablebook_reservation_service::config::Config;
use tablebook_reservation_service::establish_connection;
use tablebook_reservation_service::models::Restaurant;
use tablebook_reservation_service::schema;
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

// Tests in one binary share a database; run them one at a time.
static DATABASE: Mutex<()> = Mutex::new(());

pub fn config() -> Config {
    dotenvy::dotenv().ok();
    Config::from_env().unwrap()
}

pub fn connect() -> PgConnection {
    establish_connection(&config()).unwrap()
}

/// Migrates and empties every table. Hold the guard for the whole test.
pub fn setup_database() -> (MutexGuard<'static, ()>, PgConnection) {
    let guard = DATABASE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut conn = connect();
    conn.run_pending_migrations(MIGRATIONS).unwrap();
    // submission_events ignores DELETE, so clear with TRUNCATE.
    sql_query(
        "TRUNCATE outbox, submission_events, restaurant_submissions, reservations, \
         opening_hours, availability_settings, restaurants",
    )
    .execute(&mut conn)
    .unwrap();
    (guard, conn)
}

pub fn at(value: &str) -> FixedClock {
    FixedClock(
        DateTime::parse_from_rfc3339(value)
            .unwrap()
            .with_timezone(&Utc),
    )
}

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

pub fn time(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value, "%H:%M").unwrap()
}

pub fn diner() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Diner)
}

pub fn owner() -> Actor {
    Actor::new(Uuid::new_v4(), Role::RestaurantOwner)
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), Role::Admin)
}

pub fn seed_restaurant(conn: &mut PgConnection, owner: &Actor) -> Restaurant {
    let id = Uuid::new_v4();
    let restaurant = Restaurant {
        id,
        slug: format!("restaurant-{id}"),
        name: "Blue Door".to_string(),
        owner_id: owner.user_id,
        is_active: true,
        utc_offset_minutes: 0,
    };
    diesel::insert_into(schema::restaurants::table)
        .values(&restaurant)
        .execute(conn)
        .unwrap();
    restaurant
}

pub fn outbox_len(conn: &mut PgConnection) -> i64 {
    use diesel::QueryDsl;

    schema::outbox::table.count().get_result(conn).unwrap()
}
