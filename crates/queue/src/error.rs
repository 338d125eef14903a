//! Queue error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("undecodable event payload: {0}")]
    Decode(#[from] serde_json::Error),
}
