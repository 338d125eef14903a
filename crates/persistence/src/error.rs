//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid state blob: {0}")]
    InvalidBlob(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}
