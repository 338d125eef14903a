//! Event intake loop.
//!
//! One delivery maps to one spawned handler task, so a panic in a single
//! call's handling is contained: the delivery is NACKed without requeue and
//! the loop keeps serving other calls.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use sentiric_agent_core::CallEvent;

use crate::codec::decode_call_event;
use crate::error::QueueError;
use crate::topology::QUEUE_NAME;

const CONSUMER_TAG: &str = "agent-service";

/// Per-event dispatch seam; implemented by the call handler.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: CallEvent);
}

/// Consume the service queue until shutdown. In-flight handler tasks are
/// registered on `tracker`; the caller drains it before exiting.
pub async fn run_consumer(
    channel: Channel,
    handler: Arc<dyn EventHandler>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) -> Result<(), QueueError> {
    let mut consumer = channel
        .basic_consume(
            QUEUE_NAME,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    tracing::info!(queue = QUEUE_NAME, "Consuming events");

    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown requested, stopping event intake");
                return Ok(());
            }
            next = consumer.next() => match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(err)) => {
                    tracing::error!(error = %err, "Consumer stream error");
                    return Err(QueueError::Amqp(err));
                }
                None => {
                    tracing::warn!("Consumer stream closed by the broker");
                    return Ok(());
                }
            }
        };

        let event = match decode_call_event(&delivery.data) {
            Ok(event) => event,
            Err(err) => {
                metrics::counter!("agent_events_failed_total", "reason" => "proto_unmarshal")
                    .increment(1);
                tracing::warn!(error = %err, "Dropping undecodable delivery");
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
                    .ok();
                continue;
            }
        };
        metrics::counter!(
            "agent_events_received_total",
            "event_type" => event.event_type.clone()
        )
        .increment(1);

        let handler = Arc::clone(&handler);
        // The delivery stays unacked for the whole call so a worker crash
        // triggers redelivery. RabbitMQ's consumer_timeout must therefore
        // exceed the longest expected call; see the deployment notes.
        tracker.spawn(async move {
            // Inner spawn so a panic surfaces as a JoinError instead of
            // tearing down the consumer loop.
            let outcome = tokio::spawn(async move { handler.handle(event).await }).await;
            match outcome {
                Ok(()) => {
                    delivery.ack(BasicAckOptions::default()).await.ok();
                }
                Err(join_err) => {
                    metrics::counter!("agent_event_handler_panics_total").increment(1);
                    tracing::error!(error = %join_err, "Event handler panicked, dropping delivery");
                    delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await
                        .ok();
                }
            }
        });
    }
}
