use diesel::{sql_query, Connection, ConnectionError, PgConnection, RunQueryDsl};

pub mod authz;
pub mod availability;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod reservation;
pub mod schema;
pub mod serializer;
pub mod submission;

use config::Config;

pub const EVENT_CHANNEL: &str = "reservation.event";

/// Opens a connection with the configured `statement_timeout` applied.
pub fn establish_connection(config: &Config) -> Result<PgConnection, ConnectionError> {
    let mut conn = PgConnection::establish(&config.database_url)?;
    sql_query(format!(
        "SET statement_timeout = {}",
        config.statement_timeout_ms
    ))
    .execute(&mut conn)
    .map_err(ConnectionError::CouldntSetupConfiguration)?;
    Ok(conn)
}
