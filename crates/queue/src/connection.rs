//! AMQP connection bootstrap.

use std::time::Duration;

use lapin::options::ConfirmSelectOptions;
use lapin::{Channel, Connection, ConnectionProperties};

use crate::error::QueueError;
use crate::topology;

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Connect to the broker, retrying while it comes up. Deployments start the
/// agent and the broker together, so the first attempts routinely fail.
pub async fn connect_with_retry(url: &str) -> Result<Connection, QueueError> {
    let mut last_err = None;
    for attempt in 1..=CONNECT_ATTEMPTS {
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(conn) => {
                tracing::info!(attempt, "Connected to the message broker");
                return Ok(conn);
            }
            Err(err) => {
                tracing::warn!(
                    attempt,
                    max_attempts = CONNECT_ATTEMPTS,
                    error = %err,
                    "Broker connection failed, retrying"
                );
                last_err = Some(err);
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
        }
    }
    Err(QueueError::Amqp(last_err.expect("at least one attempt")))
}

/// A ready-to-use broker session: topology declared, one channel for
/// consuming and one in confirm mode for publishing.
pub struct AmqpBus {
    pub consume_channel: Channel,
    pub publish_channel: Channel,
    _connection: Connection,
}

pub async fn setup_bus(url: &str) -> Result<AmqpBus, QueueError> {
    let connection = connect_with_retry(url).await?;
    let consume_channel = connection.create_channel().await?;
    topology::declare(&consume_channel).await?;
    let publish_channel = connection.create_channel().await?;
    publish_channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;
    Ok(AmqpBus {
        consume_channel,
        publish_channel,
        _connection: connection,
    })
}
