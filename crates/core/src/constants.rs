//! Well-known identifiers shared with the rest of the platform.

/// Tenant used when neither the matched user nor the inbound route carries one.
pub const DEFAULT_TENANT_ID: &str = "sentiric_demo";

/// Object-storage bucket that call recordings are written to.
pub const RECORDING_BUCKET: &str = "sentiric-media-record";

/// Event types carried on the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    CallStarted,
    CallEnded,
    UserIdentifiedForCall,
    CallTerminateRequest,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CallStarted => "call.started",
            EventType::CallEnded => "call.ended",
            EventType::UserIdentifiedForCall => "user.identified.for_call",
            EventType::CallTerminateRequest => "call.terminate.request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "call.started" => Some(EventType::CallStarted),
            "call.ended" => Some(EventType::CallEnded),
            "user.identified.for_call" => Some(EventType::UserIdentifiedForCall),
            "call.terminate.request" => Some(EventType::CallTerminateRequest),
            _ => None,
        }
    }
}

/// Announcement audio rows in the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementId {
    GuestWelcome,
    SystemConnecting,
    SystemError,
    SystemMaxFailures,
    SystemCantHearYou,
    SystemCantUnderstand,
    SystemGoodbye,
}

impl AnnouncementId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnouncementId::GuestWelcome => "ANNOUNCE_GUEST_WELCOME",
            AnnouncementId::SystemConnecting => "ANNOUNCE_SYSTEM_CONNECTING",
            AnnouncementId::SystemError => "ANNOUNCE_SYSTEM_ERROR",
            AnnouncementId::SystemMaxFailures => "ANNOUNCE_SYSTEM_MAX_FAILURES",
            AnnouncementId::SystemCantHearYou => "ANNOUNCE_SYSTEM_CANT_HEAR_YOU",
            AnnouncementId::SystemCantUnderstand => "ANNOUNCE_SYSTEM_CANT_UNDERSTAND",
            AnnouncementId::SystemGoodbye => "ANNOUNCE_SYSTEM_GOODBYE",
        }
    }
}

/// Prompt template rows in the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateId {
    WelcomeKnownUser,
    WelcomeGuest,
    SystemRag,
    SystemDefault,
}

impl TemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::WelcomeKnownUser => "PROMPT_WELCOME_KNOWN_USER",
            TemplateId::WelcomeGuest => "PROMPT_WELCOME_GUEST",
            TemplateId::SystemRag => "PROMPT_SYSTEM_RAG",
            TemplateId::SystemDefault => "PROMPT_SYSTEM_DEFAULT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trip() {
        for et in [
            EventType::CallStarted,
            EventType::CallEnded,
            EventType::UserIdentifiedForCall,
            EventType::CallTerminateRequest,
        ] {
            assert_eq!(EventType::parse(et.as_str()), Some(et));
        }
        assert_eq!(EventType::parse("call.answered"), None);
    }
}
