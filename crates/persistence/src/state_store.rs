//! Typed wrapper around the key-value store.
//!
//! The store is the only cross-replica synchronization point: the per-call
//! state blob under `callstate:<call-id>` and the distributed agent lock
//! under `active_agent_lock:<call-id>`. This adapter is the sole
//! encoder/decoder of the state blob.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use sentiric_agent_core::CallState;

use crate::error::PersistenceError;

const STATE_KEY_PREFIX: &str = "callstate:";
const LOCK_KEY_PREFIX: &str = "active_agent_lock:";

/// State outlives any single worker restart but not an abandoned call.
const STATE_TTL_SECONDS: u64 = 2 * 60 * 60;
/// Lock TTL must exceed any realistic gap between duplicate deliveries.
const LOCK_TTL_SECONDS: u64 = 5 * 60;

/// Store seam for the call handler and dialog manager.
#[async_trait]
pub trait CallStateStore: Send + Sync {
    async fn get(&self, call_id: &str) -> Result<Option<CallState>, PersistenceError>;
    async fn set(&self, state: &CallState) -> Result<(), PersistenceError>;
    /// Set-if-absent distributed lock; true when this worker acquired it.
    async fn try_lock(&self, call_id: &str, trace_id: &str) -> Result<bool, PersistenceError>;
    /// Best-effort lock release.
    async fn unlock(&self, call_id: &str) -> Result<(), PersistenceError>;
    async fn delete_state(&self, call_id: &str) -> Result<(), PersistenceError>;
}

/// Redis-backed implementation.
#[derive(Clone)]
pub struct RedisCallStateStore {
    conn: ConnectionManager,
}

impl RedisCallStateStore {
    /// Connect to Redis; the connection manager reconnects transparently.
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis state store");
        Ok(Self { conn })
    }

    fn state_key(call_id: &str) -> String {
        format!("{STATE_KEY_PREFIX}{call_id}")
    }

    fn lock_key(call_id: &str) -> String {
        format!("{LOCK_KEY_PREFIX}{call_id}")
    }
}

#[async_trait]
impl CallStateStore for RedisCallStateStore {
    async fn get(&self, call_id: &str) -> Result<Option<CallState>, PersistenceError> {
        let mut conn = self.conn.clone();
        let blob: Option<String> = redis::cmd("GET")
            .arg(Self::state_key(call_id))
            .query_async(&mut conn)
            .await?;
        match blob {
            Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, state: &CallState) -> Result<(), PersistenceError> {
        let mut conn = self.conn.clone();
        let blob = serde_json::to_string(state)?;
        redis::cmd("SET")
            .arg(Self::state_key(&state.call_id))
            .arg(blob)
            .arg("EX")
            .arg(STATE_TTL_SECONDS)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn try_lock(&self, call_id: &str, trace_id: &str) -> Result<bool, PersistenceError> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::lock_key(call_id))
            .arg(trace_id)
            .arg("NX")
            .arg("EX")
            .arg(LOCK_TTL_SECONDS)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    async fn unlock(&self, call_id: &str) -> Result<(), PersistenceError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::lock_key(call_id))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_state(&self, call_id: &str) -> Result<(), PersistenceError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::state_key(call_id))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_call() {
        assert_eq!(RedisCallStateStore::state_key("c-1"), "callstate:c-1");
        assert_eq!(
            RedisCallStateStore::lock_key("c-1"),
            "active_agent_lock:c-1"
        );
    }
}
