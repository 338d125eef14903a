//! Inbound call events and outbound bus payloads.
//!
//! The wire shapes mirror what the telephony layer publishes: `call.started`
//! carries the resolved dialplan (action, matched user/contact, inbound
//! route) and the media descriptor for the allocated RTP leg.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Inbound event from the message bus. Immutable for the core, except that
/// the call handler fills `matched_user`/`matched_contact` after resolving
/// a guest caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub trace_id: String,
    pub call_id: String,
    /// Origin URI; either a bare number or `Name <sip:number@host>`.
    #[serde(default, rename = "from")]
    pub from_uri: String,
    #[serde(default)]
    pub media: Option<MediaInfo>,
    #[serde(default)]
    pub dialplan: Option<Dialplan>,
}

impl CallEvent {
    /// Action-data knob lookup (`speaker_wav_url`, `voice_selector`,
    /// `stt_vad_level`, ...). Absent levels of nesting read as absent keys.
    pub fn action_datum(&self, key: &str) -> Option<&str> {
        self.dialplan
            .as_ref()?
            .action
            .as_ref()?
            .action_data
            .as_ref()?
            .data
            .get(key)
            .map(String::as_str)
    }

    pub fn action_name(&self) -> Option<&str> {
        Some(self.dialplan.as_ref()?.action.as_ref()?.action.as_str())
    }

    /// Best language code for this caller: the matched user's preference,
    /// else the inbound route default, else `"tr"`.
    pub fn language_code(&self) -> &str {
        if let Some(dialplan) = &self.dialplan {
            if let Some(user) = &dialplan.matched_user {
                if let Some(lang) = &user.preferred_language_code {
                    if !lang.is_empty() {
                        return lang;
                    }
                }
            }
            if let Some(route) = &dialplan.inbound_route {
                if !route.default_language_code.is_empty() {
                    return &route.default_language_code;
                }
            }
        }
        "tr"
    }
}

/// RTP leg descriptor from the media engine.
///
/// `server_rtp_port` stays loosely typed: the upstream payload is not under
/// our control, and a missing or non-numeric port must abort the operation
/// that needs it rather than the event parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub caller_rtp_addr: String,
    #[serde(default)]
    pub server_rtp_port: serde_json::Value,
}

impl MediaInfo {
    pub fn rtp_port(&self) -> Result<u32, AgentError> {
        self.server_rtp_port
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                AgentError::InvalidEvent("server_rtp_port missing or not numeric".into())
            })
    }
}

/// Pre-resolved dialplan attached to `call.started`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialplan {
    #[serde(default)]
    pub dialplan_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub action: Option<DialplanAction>,
    #[serde(default)]
    pub matched_user: Option<MatchedUser>,
    #[serde(default)]
    pub matched_contact: Option<MatchedContact>,
    #[serde(default)]
    pub inbound_route: Option<InboundRoute>,
}

/// Tagged dialplan variant: the action name drives dispatch, action-specific
/// knobs live in the string map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialplanAction {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub action_data: Option<ActionData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub contacts: Vec<MatchedContact>,
    #[serde(default)]
    pub preferred_language_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedContact {
    pub id: i32,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub contact_type: String,
    #[serde(default)]
    pub contact_value: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRoute {
    #[serde(default)]
    pub default_language_code: String,
    #[serde(default)]
    pub tenant_id: String,
}

/// Published once per call when the caller identity is known, whether the
/// user was found by the dialplan or created on the fly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentifiedEvent {
    pub event_type: String,
    pub trace_id: String,
    pub call_id: String,
    pub user_id: String,
    pub contact_id: i32,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Asks the signaling layer to hang up the SIP leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTerminateRequest {
    pub event_type: String,
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event_json() -> &'static str {
        r#"{
            "eventType": "call.started",
            "traceId": "trace-1",
            "callId": "call-1",
            "from": "Bob <sip:905551234567@sip.example.com>",
            "media": {"caller_rtp_addr": "10.0.0.5:10200", "server_rtp_port": 10002},
            "dialplan": {
                "dialplanId": "dp-1",
                "tenantId": "acme",
                "action": {
                    "action": "START_AI_CONVERSATION",
                    "actionData": {"data": {"stt_vad_level": "2"}}
                },
                "matchedUser": {
                    "id": "u-1",
                    "name": "Ada",
                    "tenantId": "acme",
                    "userType": "caller",
                    "contacts": [],
                    "preferredLanguageCode": "en"
                },
                "inboundRoute": {"defaultLanguageCode": "de", "tenantId": "acme"}
            }
        }"#
    }

    #[test]
    fn parses_call_started_payload() {
        let event: CallEvent = serde_json::from_str(sample_event_json()).unwrap();
        assert_eq!(event.call_id, "call-1");
        assert_eq!(event.action_name(), Some("START_AI_CONVERSATION"));
        assert_eq!(event.action_datum("stt_vad_level"), Some("2"));
        assert_eq!(event.action_datum("speaker_wav_url"), None);
        assert_eq!(event.media.as_ref().unwrap().rtp_port().unwrap(), 10002);
    }

    #[test]
    fn language_prefers_user_then_route_then_turkish() {
        let mut event: CallEvent = serde_json::from_str(sample_event_json()).unwrap();
        assert_eq!(event.language_code(), "en");

        event
            .dialplan
            .as_mut()
            .unwrap()
            .matched_user
            .as_mut()
            .unwrap()
            .preferred_language_code = None;
        assert_eq!(event.language_code(), "de");

        event.dialplan.as_mut().unwrap().inbound_route = None;
        assert_eq!(event.language_code(), "tr");
    }

    #[test]
    fn non_numeric_rtp_port_is_rejected_lazily() {
        let json = r#"{"callId": "c", "media": {"caller_rtp_addr": "a", "server_rtp_port": "oops"}}"#;
        let event: CallEvent = serde_json::from_str(json).unwrap();
        assert!(event.media.unwrap().rtp_port().is_err());
    }

    #[test]
    fn missing_media_port_is_rejected() {
        let json = r#"{"callId": "c", "media": {"caller_rtp_addr": "a"}}"#;
        let event: CallEvent = serde_json::from_str(json).unwrap();
        assert!(event.media.unwrap().rtp_port().is_err());
    }
}
