//! AMQP intake and publishing: topology declaration, the panic-isolating
//! consumer loop, the durable JSON publisher, and delivery decoding.

pub mod codec;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod publisher;
pub mod topology;

pub use codec::{contact_from_proto, decode_call_event, user_from_proto};
pub use connection::{connect_with_retry, setup_bus, AmqpBus};
pub use consumer::{run_consumer, EventHandler};
pub use error::QueueError;
pub use publisher::{AmqpEventPublisher, EventPublisher};
pub use topology::{declare, EXCHANGE_NAME, QUEUE_NAME};
