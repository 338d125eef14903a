//! Durable per-call dialog state.
//!
//! The state blob lives in the key-value store under `callstate:<call-id>`
//! and is re-read at the top of every dialog-loop iteration, so external
//! mutators (`call.ended`) are observed at well-defined checkpoints.

use serde::{Deserialize, Serialize};

use crate::event::CallEvent;

/// Dialog state machine states. `Ended` is set externally by `call.ended`;
/// `Terminated` is set internally on fatal error or max failures. Both are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogState {
    Welcoming,
    Listening,
    Thinking,
    Speaking,
    Ended,
    Terminated,
}

impl DialogState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DialogState::Ended | DialogState::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialogState::Welcoming => "WELCOMING",
            DialogState::Listening => "LISTENING",
            DialogState::Thinking => "THINKING",
            DialogState::Speaking => "SPEAKING",
            DialogState::Ended => "ENDED",
            DialogState::Terminated => "TERMINATED",
        }
    }
}

impl std::fmt::Display for DialogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversation turn. Serializes as a single-entry map
/// (`{"user": text}` / `{"ai": text}`), the transcript wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Turn {
    User(String),
    Ai(String),
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User(text.into())
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Turn::Ai(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            Turn::User(t) | Turn::Ai(t) => t,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Turn::User(_))
    }
}

/// Per-call durable record. Field names follow the platform's established
/// blob format so workers of mixed versions can share a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallState {
    #[serde(rename = "CallID")]
    pub call_id: String,
    #[serde(rename = "TraceID")]
    pub trace_id: String,
    #[serde(rename = "TenantID")]
    pub tenant_id: String,
    #[serde(rename = "CurrentState")]
    pub current_state: DialogState,
    #[serde(rename = "Event")]
    pub event: CallEvent,
    #[serde(rename = "Conversation", default)]
    pub conversation: Vec<Turn>,
    #[serde(rename = "ConsecutiveFailures", default)]
    pub consecutive_failures: u32,
}

impl CallState {
    pub fn new(event: CallEvent, tenant_id: String) -> Self {
        Self {
            call_id: event.call_id.clone(),
            trace_id: event.trace_id.clone(),
            tenant_id,
            current_state: DialogState::Welcoming,
            event,
            conversation: Vec::new(),
            consecutive_failures: 0,
        }
    }

    /// Most recent user utterance, if any.
    pub fn last_user_turn(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|t| t.is_user())
            .map(Turn::text)
    }

    /// Most recent AI utterance, if any.
    pub fn last_ai_turn(&self) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|t| !t.is_user())
            .map(Turn::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CallEvent;

    fn state_with_turns(turns: Vec<Turn>) -> CallState {
        let event: CallEvent = serde_json::from_str(r#"{"callId": "c-1"}"#).unwrap();
        let mut st = CallState::new(event, "acme".into());
        st.conversation = turns;
        st
    }

    #[test]
    fn turn_serializes_as_single_entry_map() {
        assert_eq!(
            serde_json::to_string(&Turn::user("hello")).unwrap(),
            r#"{"user":"hello"}"#
        );
        assert_eq!(
            serde_json::to_string(&Turn::ai("hi there")).unwrap(),
            r#"{"ai":"hi there"}"#
        );
    }

    #[test]
    fn call_state_round_trips_without_loss() {
        let mut st = state_with_turns(vec![Turn::ai("welcome"), Turn::user("hello")]);
        st.current_state = DialogState::Thinking;
        st.consecutive_failures = 1;

        let blob = serde_json::to_string(&st).unwrap();
        let back: CallState = serde_json::from_str(&blob).unwrap();
        assert_eq!(back.call_id, st.call_id);
        assert_eq!(back.current_state, DialogState::Thinking);
        assert_eq!(back.consecutive_failures, 1);
        assert_eq!(back.conversation, st.conversation);
    }

    #[test]
    fn dialog_state_uses_screaming_wire_names() {
        let blob = serde_json::to_string(&DialogState::Welcoming).unwrap();
        assert_eq!(blob, r#""WELCOMING""#);
        let back: DialogState = serde_json::from_str(r#""TERMINATED""#).unwrap();
        assert!(back.is_terminal());
    }

    #[test]
    fn last_turns_scan_backwards() {
        let st = state_with_turns(vec![
            Turn::ai("welcome"),
            Turn::user("question one"),
            Turn::ai("answer one"),
            Turn::user("question two"),
        ]);
        assert_eq!(st.last_user_turn(), Some("question two"));
        assert_eq!(st.last_ai_turn(), Some("answer one"));
    }
}
