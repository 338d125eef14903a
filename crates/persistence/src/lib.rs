//! Persistence layer: Redis call-state store and Postgres template provider.

pub mod error;
pub mod prompts;
pub mod state_store;
pub mod templates;

pub use error::PersistenceError;
pub use state_store::{CallStateStore, RedisCallStateStore};
pub use templates::{PgTemplateStore, TemplateProvider};
