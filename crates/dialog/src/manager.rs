//! The per-call dialog state machine.
//!
//! One manager run owns one call from greeting to hang-up. State is re-read
//! from the store at the top of every iteration, so external transitions
//! (the signaling layer marking the call ended) take effect at the next
//! checkpoint without any in-process signaling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sentiric_agent_clients::LlmClient;
use sentiric_agent_core::{
    AgentError, AnnouncementId, CallEvent, CallState, DialogState, Turn, DEFAULT_TENANT_ID,
};
use sentiric_agent_persistence::{CallStateStore, TemplateProvider};
use sentiric_agent_queue::EventPublisher;

use crate::heuristics;
use crate::knowledge::KnowledgeStore;
use crate::media::{recording_uri, MediaBridge};
use crate::synthesis::SpeechSynthesizer;
use crate::transcribe::{Transcriber, Transcript};

/// Settle time before the opening line, so the RTP leg is fully up.
const WELCOME_SETTLE: Duration = Duration::from_millis(1500);
/// Pause after each spoken reply before listening again.
const SPEAKING_SETTLE: Duration = Duration::from_millis(250);

const ACTION_PROCESS_GUEST_CALL: &str = "PROCESS_GUEST_CALL";

/// Tenant for a call: the matched user's tenant wins, then the inbound
/// route's, then the platform default.
pub fn resolve_tenant_id(event: &CallEvent) -> String {
    if let Some(dialplan) = &event.dialplan {
        if let Some(user) = &dialplan.matched_user {
            if !user.tenant_id.is_empty() {
                return user.tenant_id.clone();
            }
        }
        if let Some(route) = &dialplan.inbound_route {
            if !route.tenant_id.is_empty() {
                return route.tenant_id.clone();
            }
        }
    }
    DEFAULT_TENANT_ID.to_string()
}

/// Seam between the call handler and the state machine.
#[async_trait]
pub trait CallRunner: Send + Sync {
    async fn run(&self, event: CallEvent, cancel: CancellationToken);
}

pub struct DialogManager {
    store: Arc<dyn CallStateStore>,
    templates: Arc<dyn TemplateProvider>,
    media: Arc<dyn MediaBridge>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    transcriber: Arc<dyn Transcriber>,
    llm: Arc<dyn LlmClient>,
    publisher: Arc<dyn EventPublisher>,
    max_consecutive_failures: u32,
}

impl DialogManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn CallStateStore>,
        templates: Arc<dyn TemplateProvider>,
        media: Arc<dyn MediaBridge>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        knowledge: Option<Arc<dyn KnowledgeStore>>,
        transcriber: Arc<dyn Transcriber>,
        llm: Arc<dyn LlmClient>,
        publisher: Arc<dyn EventPublisher>,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            store,
            templates,
            media,
            synthesizer,
            knowledge,
            transcriber,
            llm,
            publisher,
            max_consecutive_failures,
        }
    }

    /// Drive one call to completion. Never panics outward; every failure
    /// path lands the call in a terminal state.
    pub async fn run_call(&self, event: CallEvent, cancel: CancellationToken) {
        let tenant_id = resolve_tenant_id(&event);
        let call_id = event.call_id.clone();
        let trace_id = event.trace_id.clone();
        tracing::info!(%call_id, %trace_id, %tenant_id, "Starting dialog");

        self.publish_identity(&event, &tenant_id).await;

        let state = CallState::new(event, tenant_id);
        if let Err(err) = self.store.set(&state).await {
            tracing::error!(%call_id, %trace_id, error = %err, "Cannot persist initial state");
            return;
        }

        let welcome = if state.event.action_name() == Some(ACTION_PROCESS_GUEST_CALL) {
            AnnouncementId::GuestWelcome
        } else {
            AnnouncementId::SystemConnecting
        };
        self.announce(&state, welcome).await;

        if let Some(media_info) = &state.event.media {
            let output_uri = recording_uri(&state.tenant_id, &call_id);
            if let Err(err) = self
                .media
                .start_recording(&trace_id, &call_id, media_info, &output_uri)
                .await
            {
                tracing::warn!(%call_id, %trace_id, error = %err, "Recording unavailable for this call");
            }
        }

        self.run_loop(&call_id, &cancel).await;

        if let Some(media_info) = &state.event.media {
            if let Err(err) = self.media.stop_recording(&trace_id, media_info).await {
                tracing::warn!(%call_id, %trace_id, error = %err, "Stop recording failed");
            }
        }

        // The terminate request must reflect the state as it is now, not as
        // this worker last wrote it: an external `call.ended` means the leg
        // is already gone.
        match self.store.get(&call_id).await {
            Ok(Some(final_state)) if final_state.current_state == DialogState::Terminated => {
                if let Err(err) = self.publisher.publish_terminate_request(&call_id).await {
                    tracing::error!(%call_id, %trace_id, error = %err, "Terminate request not published");
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(%call_id, %trace_id, error = %err, "Final state unreadable");
            }
        }
        tracing::info!(%call_id, %trace_id, "Dialog finished");
    }

    /// Announce the caller's identity on the bus when the dialplan (or the
    /// guest flow before us) resolved both user and contact.
    async fn publish_identity(&self, event: &CallEvent, tenant_id: &str) {
        let resolved = event.dialplan.as_ref().and_then(|d| {
            Some((d.matched_user.as_ref()?, d.matched_contact.as_ref()?))
        });
        match resolved {
            Some((user, contact)) => {
                if let Err(err) = self
                    .publisher
                    .publish_user_identified(
                        &event.trace_id,
                        &event.call_id,
                        &user.id,
                        contact.id,
                        tenant_id,
                    )
                    .await
                {
                    tracing::error!(
                        call_id = %event.call_id,
                        trace_id = %event.trace_id,
                        error = %err,
                        "user.identified.for_call not published"
                    );
                }
            }
            None => {
                tracing::warn!(
                    call_id = %event.call_id,
                    trace_id = %event.trace_id,
                    "No matched user/contact, skipping identity event"
                );
            }
        }
    }

    async fn run_loop(&self, call_id: &str, cancel: &CancellationToken) {
        loop {
            let mut state = match self.store.get(call_id).await {
                Ok(Some(state)) => state,
                Ok(None) => {
                    tracing::info!(%call_id, "Call state gone, ending dialog");
                    return;
                }
                Err(err) => {
                    tracing::error!(%call_id, error = %err, "State store unreadable, ending dialog");
                    return;
                }
            };
            if state.current_state.is_terminal() {
                return;
            }
            if cancel.is_cancelled() {
                state.current_state = DialogState::Ended;
                self.persist(&state).await;
                return;
            }

            let result = match state.current_state {
                DialogState::Welcoming => self.handle_welcoming(&mut state).await,
                DialogState::Listening => self.handle_listening(&mut state, cancel).await,
                DialogState::Thinking => self.handle_thinking(&mut state).await,
                DialogState::Speaking => self.handle_speaking(&mut state).await,
                DialogState::Ended | DialogState::Terminated => return,
            };

            match result {
                Ok(()) => self.persist(&state).await,
                Err(err) if err.is_cancelled() => {
                    tracing::info!(%call_id, "Dialog cancelled");
                    state.current_state = DialogState::Ended;
                    self.persist(&state).await;
                    return;
                }
                Err(err) => {
                    tracing::error!(
                        %call_id,
                        trace_id = %state.trace_id,
                        state = %state.current_state,
                        error = %err,
                        "Dialog step failed, terminating call"
                    );
                    self.announce(&state, AnnouncementId::SystemError).await;
                    state.current_state = DialogState::Terminated;
                    self.persist(&state).await;
                    return;
                }
            }
        }
    }

    async fn persist(&self, state: &CallState) {
        if let Err(err) = self.store.set(state).await {
            tracing::error!(
                call_id = %state.call_id,
                trace_id = %state.trace_id,
                error = %err,
                "State not persisted"
            );
        }
    }

    async fn handle_welcoming(&self, state: &mut CallState) -> Result<(), AgentError> {
        tokio::time::sleep(WELCOME_SETTLE).await;
        let prompt = self.templates.welcome_prompt(state).await;
        let text = self.llm.generate(&prompt, &state.trace_id).await?;
        state.conversation.push(Turn::ai(text.clone()));
        self.speak(state, &text).await?;
        state.current_state = DialogState::Listening;
        Ok(())
    }

    async fn handle_listening(
        &self,
        state: &mut CallState,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        if state.consecutive_failures >= self.max_consecutive_failures {
            tracing::warn!(
                call_id = %state.call_id,
                trace_id = %state.trace_id,
                failures = state.consecutive_failures,
                "Too many unusable turns, giving up"
            );
            self.announce(state, AnnouncementId::SystemMaxFailures).await;
            state.current_state = DialogState::Terminated;
            return Ok(());
        }

        match self.transcriber.listen(state, cancel).await {
            Ok(Transcript::Final(text)) => {
                if heuristics::is_meaningless(&text) {
                    tracing::info!(
                        call_id = %state.call_id,
                        trace_id = %state.trace_id,
                        transcript = %text,
                        "Unusable transcript"
                    );
                    self.announce(state, AnnouncementId::SystemCantUnderstand).await;
                    state.consecutive_failures += 1;
                } else {
                    state.consecutive_failures = 0;
                    state.conversation.push(Turn::user(text));
                    state.current_state = DialogState::Thinking;
                }
            }
            // Silence is not the caller's fault: prompt again, no failure.
            Ok(Transcript::NoSpeech) => {
                self.announce(state, AnnouncementId::SystemCantHearYou).await;
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    call_id = %state.call_id,
                    trace_id = %state.trace_id,
                    error = %err,
                    "Transcription failed"
                );
                self.announce(state, AnnouncementId::SystemError).await;
                state.consecutive_failures += 1;
            }
        }
        Ok(())
    }

    async fn handle_thinking(&self, state: &mut CallState) -> Result<(), AgentError> {
        let user_text = state.last_user_turn().unwrap_or_default().to_string();

        if heuristics::wants_termination(&user_text) {
            tracing::info!(
                call_id = %state.call_id,
                trace_id = %state.trace_id,
                "Caller said goodbye"
            );
            self.announce(state, AnnouncementId::SystemGoodbye).await;
            state.current_state = DialogState::Terminated;
            return Ok(());
        }

        let mut rag_context = String::new();
        if let Some(knowledge) = &self.knowledge {
            if heuristics::should_query_knowledge(&user_text) {
                match knowledge
                    .query(&state.tenant_id, &user_text, &state.trace_id)
                    .await
                {
                    Ok(context) => rag_context = context,
                    Err(err) => {
                        tracing::warn!(
                            call_id = %state.call_id,
                            trace_id = %state.trace_id,
                            error = %err,
                            "Knowledge query failed, answering ungrounded"
                        );
                    }
                }
            }
        }

        let prompt = self.templates.llm_prompt(state, &rag_context).await;
        let reply = self.llm.generate(&prompt, &state.trace_id).await?;
        state.conversation.push(Turn::ai(reply));
        state.current_state = DialogState::Speaking;
        Ok(())
    }

    async fn handle_speaking(&self, state: &mut CallState) -> Result<(), AgentError> {
        if let Some(text) = state.last_ai_turn().map(str::to_string) {
            self.speak(state, &text).await?;
        }
        tokio::time::sleep(SPEAKING_SETTLE).await;
        state.current_state = DialogState::Listening;
        Ok(())
    }

    async fn speak(&self, state: &CallState, text: &str) -> Result<(), AgentError> {
        let media_info = state
            .event
            .media
            .as_ref()
            .ok_or_else(|| AgentError::InvalidEvent("call event carries no media info".into()))?;
        let audio_uri = self.synthesizer.synthesize(state, text).await?;
        self.media.play(&state.trace_id, media_info, &audio_uri).await
    }

    /// Best effort: a missing or unplayable announcement is logged, never
    /// escalated.
    async fn announce(&self, state: &CallState, id: AnnouncementId) {
        let language = state.event.language_code();
        let path = match self
            .templates
            .get_announcement_path(id.as_str(), &state.tenant_id, language)
            .await
        {
            Ok(path) => path,
            Err(_) => {
                match self
                    .templates
                    .get_announcement_path(id.as_str(), "system", "en")
                    .await
                {
                    Ok(path) => path,
                    Err(err) => {
                        tracing::error!(
                            call_id = %state.call_id,
                            trace_id = %state.trace_id,
                            announcement = id.as_str(),
                            error = %err,
                            "Announcement audio not found"
                        );
                        return;
                    }
                }
            }
        };
        let uri = if path.contains("://") {
            path
        } else {
            format!("file://{path}")
        };
        if let Some(media_info) = &state.event.media {
            if let Err(err) = self.media.play(&state.trace_id, media_info, &uri).await {
                tracing::warn!(
                    call_id = %state.call_id,
                    trace_id = %state.trace_id,
                    announcement = id.as_str(),
                    error = %err,
                    "Announcement playback failed"
                );
            }
        }
    }
}

#[async_trait]
impl CallRunner for DialogManager {
    async fn run(&self, event: CallEvent, cancel: CancellationToken) {
        self.run_call(event, cancel).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_from(json: &str) -> CallEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn tenant_prefers_user_then_route_then_default() {
        let event = event_from(
            r#"{"callId": "c", "dialplan": {
                "matchedUser": {"id": "u", "tenantId": "acme"},
                "inboundRoute": {"tenantId": "route-tenant", "defaultLanguageCode": "tr"}
            }}"#,
        );
        assert_eq!(resolve_tenant_id(&event), "acme");

        let event = event_from(
            r#"{"callId": "c", "dialplan": {
                "inboundRoute": {"tenantId": "route-tenant", "defaultLanguageCode": "tr"}
            }}"#,
        );
        assert_eq!(resolve_tenant_id(&event), "route-tenant");

        let event = event_from(r#"{"callId": "c"}"#);
        assert_eq!(resolve_tenant_id(&event), "sentiric_demo");
    }
}
