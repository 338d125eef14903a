//! Broker topology shared by consumer and publisher.

use lapin::options::{
    BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};

use crate::error::QueueError;

pub const EXCHANGE_NAME: &str = "sentiric_events";
pub const QUEUE_NAME: &str = "sentiric.agent_service.events";

/// The agent observes the whole event stream and filters in-process.
const BINDING_KEY: &str = "#";
const PREFETCH: u16 = 10;

/// Declare the durable exchange, the service queue, and its binding, and
/// bound the number of unacked deliveries per worker.
pub async fn declare(channel: &Channel) -> Result<(), QueueError> {
    channel
        .exchange_declare(
            EXCHANGE_NAME,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(
            QUEUE_NAME,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            QUEUE_NAME,
            EXCHANGE_NAME,
            BINDING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .basic_qos(PREFETCH, BasicQosOptions::default())
        .await?;
    Ok(())
}
