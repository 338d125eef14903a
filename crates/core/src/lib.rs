//! Core types for the Sentiric agent service
//!
//! This crate provides the foundational types used across all other crates:
//! - Inbound call events and dialplan payloads
//! - Durable per-call state and dialog turns
//! - Announcement, template and event-type identifiers
//! - Error types

pub mod constants;
pub mod error;
pub mod event;
pub mod state;

pub use constants::{AnnouncementId, EventType, TemplateId, DEFAULT_TENANT_ID, RECORDING_BUCKET};
pub use error::{AgentError, Result};
pub use event::{
    ActionData, CallEvent, CallTerminateRequest, Dialplan, DialplanAction, InboundRoute,
    MatchedContact, MatchedUser, MediaInfo, UserIdentifiedEvent,
};
pub use state::{CallState, DialogState, Turn};
