use std::{thread::sleep, time::Duration};

use diesel::result::Error as DieselError;
use diesel::{
    Connection, ExpressionMethods, PgConnection, QueryDsl, RunQueryDsl, SelectableHelper,
};
use kafka::client::RequiredAcks;
use kafka::producer::{Producer, Record};
use tablebook_reservation_service::config::Config;
use tablebook_reservation_service::models::Outbox;
use tablebook_reservation_service::{establish_connection, schema};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
enum OutboxProcessingError {
    #[error("database error")]
    Database(#[from] DieselError),
    #[error("kafka error: {0}")]
    Kafka(kafka::Error),
}

struct OutboxProcessor {
    kafka: Producer,
}

impl OutboxProcessor {
    /// Sends the oldest unlocked row and deletes it in the same transaction.
    /// Returns `false` when the outbox is empty.
    fn process_next_outbox_row(
        &mut self,
        conn: &mut PgConnection,
    ) -> Result<bool, OutboxProcessingError> {
        use schema::outbox::dsl::*;

        conn.transaction::<_, OutboxProcessingError, _>(|conn| {
            let row = match outbox
                .select(Outbox::as_select())
                .order(id.asc())
                .for_update()
                .skip_locked()
                .first::<Outbox>(conn)
            {
                Ok(row) => row,
                Err(DieselError::NotFound) => return Ok(false),
                Err(err) => return Err(err.into()),
            };

            self.kafka
                .send(&Record::from_key_value(
                    &row.topic,
                    row.key.clone(),
                    row.value.clone(),
                ))
                .map_err(OutboxProcessingError::Kafka)?;

            diesel::delete(outbox.filter(id.eq(row.id))).execute(conn)?;
            debug!(outbox_id = row.id, topic = %row.topic, key = %row.key, "outbox row relayed");

            Ok(true)
        })
    }
}

pub async fn main(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let kafka_url = config.kafka_url()?.to_string();
    let mut conn = establish_connection(&config)?;
    let producer = Producer::from_hosts(vec![kafka_url])
        .with_ack_timeout(Duration::from_secs(1))
        .with_required_acks(RequiredAcks::One)
        .create()?;

    let mut processor = OutboxProcessor { kafka: producer };
    info!("relaying outbox to kafka");

    tokio::task::spawn_blocking(move || loop {
        match processor.process_next_outbox_row(&mut conn) {
            Ok(true) => {}
            Ok(false) => sleep(Duration::from_secs(1)),
            Err(err) => {
                error!(error = %err, "error processing outbox row");
                sleep(Duration::from_secs(1));
            }
        }
    })
    .await?;

    Ok(())
}
