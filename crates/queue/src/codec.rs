//! Delivery payload decoding.
//!
//! The signaling layer publishes `call.started` as a length-delimited
//! protobuf `CallStartedEvent`; older publishers and the internal events
//! use plain JSON. Both are accepted: protobuf first, JSON as fallback.

use prost::Message;
use serde_json::json;

use sentiric_agent_contracts::event::v1 as pb;
use sentiric_agent_core::{
    ActionData, CallEvent, Dialplan, DialplanAction, InboundRoute, MatchedContact, MatchedUser,
    MediaInfo,
};

use crate::error::QueueError;

/// Decode a raw delivery into a [`CallEvent`].
pub fn decode_call_event(payload: &[u8]) -> Result<CallEvent, QueueError> {
    match pb::CallStartedEvent::decode_length_delimited(payload) {
        Ok(proto) if !proto.call_id.is_empty() => {
            metrics::counter!("agent_events_decoded_total", "codec" => "protobuf").increment(1);
            Ok(from_proto(proto))
        }
        _ => {
            let event: CallEvent = serde_json::from_slice(payload)?;
            metrics::counter!("agent_events_decoded_total", "codec" => "json").increment(1);
            Ok(event)
        }
    }
}

fn from_proto(proto: pb::CallStartedEvent) -> CallEvent {
    CallEvent {
        event_type: proto.event_type,
        trace_id: proto.trace_id,
        call_id: proto.call_id,
        from_uri: proto.from_uri,
        media: proto.media_info.map(|m| MediaInfo {
            caller_rtp_addr: m.caller_rtp_addr,
            server_rtp_port: json!(m.server_rtp_port),
        }),
        dialplan: proto.dialplan_resolution.map(|d| Dialplan {
            dialplan_id: d.dialplan_id,
            tenant_id: d.tenant_id,
            action: d.action.map(|a| DialplanAction {
                action: a.action,
                action_data: a.action_data.map(|ad| ActionData { data: ad.data }),
            }),
            matched_user: d.matched_user.map(user_from_proto),
            matched_contact: d.matched_contact.map(contact_from_proto),
            inbound_route: d.inbound_route.map(|r| InboundRoute {
                default_language_code: r.default_language_code,
                tenant_id: r.tenant_id,
            }),
        }),
    }
}

/// Also used by the guest-call flow after `CreateUser`.
pub fn user_from_proto(user: sentiric_agent_contracts::user::v1::User) -> MatchedUser {
    MatchedUser {
        id: user.id,
        name: user.name,
        tenant_id: user.tenant_id,
        user_type: user.user_type,
        contacts: user.contacts.into_iter().map(contact_from_proto).collect(),
        preferred_language_code: user.preferred_language_code,
    }
}

pub fn contact_from_proto(contact: sentiric_agent_contracts::user::v1::Contact) -> MatchedContact {
    MatchedContact {
        id: contact.id,
        user_id: contact.user_id,
        contact_type: contact.contact_type,
        contact_value: contact.contact_value,
        is_primary: contact.is_primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn decodes_length_delimited_protobuf() {
        let proto = pb::CallStartedEvent {
            event_type: "call.started".into(),
            trace_id: "t-1".into(),
            call_id: "c-1".into(),
            from_uri: "sip:905551234567@host".into(),
            media_info: Some(pb::MediaInfo {
                caller_rtp_addr: "10.0.0.5:10200".into(),
                server_rtp_port: 10002,
            }),
            dialplan_resolution: Some(pb::DialplanResolution {
                dialplan_id: "dp-1".into(),
                tenant_id: "acme".into(),
                action: Some(pb::DialplanAction {
                    action: "START_AI_CONVERSATION".into(),
                    action_data: None,
                }),
                matched_user: None,
                matched_contact: None,
                inbound_route: None,
            }),
        };
        let payload = proto.encode_length_delimited_to_vec();

        let event = decode_call_event(&payload).unwrap();
        assert_eq!(event.call_id, "c-1");
        assert_eq!(event.action_name(), Some("START_AI_CONVERSATION"));
        assert_eq!(event.media.unwrap().rtp_port().unwrap(), 10002);
    }

    #[test]
    fn falls_back_to_json() {
        let payload = br#"{"eventType": "call.ended", "callId": "c-2", "traceId": "t-2"}"#;
        let event = decode_call_event(payload).unwrap();
        assert_eq!(event.event_type, "call.ended");
        assert_eq!(event.call_id, "c-2");
    }

    #[test]
    fn garbage_payload_is_an_error() {
        assert!(decode_call_event(&[0xff, 0xfe, 0x00]).is_err());
    }
}
