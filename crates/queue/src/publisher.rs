//! Event publishing to the platform bus.

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};

use sentiric_agent_core::{AgentError, CallTerminateRequest, EventType, UserIdentifiedEvent};

use crate::topology::EXCHANGE_NAME;

/// Publishing seam for the call handler and dialog manager.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a JSON payload with the event type as the routing key.
    async fn publish_json(
        &self,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<(), AgentError>;

    async fn publish_user_identified(
        &self,
        trace_id: &str,
        call_id: &str,
        user_id: &str,
        contact_id: i32,
        tenant_id: &str,
    ) -> Result<(), AgentError> {
        let event = UserIdentifiedEvent {
            event_type: EventType::UserIdentifiedForCall.as_str().to_string(),
            trace_id: trace_id.to_string(),
            call_id: call_id.to_string(),
            user_id: user_id.to_string(),
            contact_id,
            tenant_id: tenant_id.to_string(),
            timestamp: Utc::now(),
        };
        self.publish_json(
            EventType::UserIdentifiedForCall,
            serde_json::to_value(event)?,
        )
        .await
    }

    /// Ask the signaling layer to hang up the SIP leg.
    async fn publish_terminate_request(&self, call_id: &str) -> Result<(), AgentError> {
        let event = CallTerminateRequest {
            event_type: EventType::CallTerminateRequest.as_str().to_string(),
            call_id: call_id.to_string(),
            timestamp: Utc::now(),
        };
        self.publish_json(EventType::CallTerminateRequest, serde_json::to_value(event)?)
            .await
    }
}

/// AMQP-backed publisher.
#[derive(Clone)]
pub struct AmqpEventPublisher {
    channel: Channel,
}

impl AmqpEventPublisher {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_json(
        &self,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<(), AgentError> {
        let body = serde_json::to_vec(&payload)?;
        let confirm = self
            .channel
            .basic_publish(
                EXCHANGE_NAME,
                event_type.as_str(),
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(|e| AgentError::Publish(format!("{}: {e}", event_type.as_str())))?;
        confirm
            .await
            .map_err(|e| AgentError::Publish(format!("{} confirm: {e}", event_type.as_str())))?;
        tracing::debug!(event_type = event_type.as_str(), "Event published");
        Ok(())
    }
}
