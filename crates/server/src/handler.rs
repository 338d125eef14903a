//! Per-event call handling: locking, action dispatch, guest resolution.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sentiric_agent_clients::{parse_caller_number, UserDirectory};
use sentiric_agent_core::{AgentError, CallEvent, EventType};
use sentiric_agent_dialog::CallRunner;
use sentiric_agent_persistence::CallStateStore;
use sentiric_agent_queue::{contact_from_proto, user_from_proto, EventHandler};

const ACTION_START_AI_CONVERSATION: &str = "START_AI_CONVERSATION";
const ACTION_PROCESS_GUEST_CALL: &str = "PROCESS_GUEST_CALL";

/// Routes bus events into the dialog machinery. One instance serves all
/// calls; per-call exclusivity comes from the distributed lock.
pub struct CallHandler {
    store: Arc<dyn CallStateStore>,
    users: Arc<dyn UserDirectory>,
    runner: Arc<dyn CallRunner>,
    root_cancel: CancellationToken,
}

impl CallHandler {
    pub fn new(
        store: Arc<dyn CallStateStore>,
        users: Arc<dyn UserDirectory>,
        runner: Arc<dyn CallRunner>,
        root_cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            users,
            runner,
            root_cancel,
        }
    }

    async fn handle_call_started(&self, mut event: CallEvent) {
        let call_id = event.call_id.clone();
        let trace_id = event.trace_id.clone();

        match self.store.try_lock(&call_id, &trace_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%call_id, %trace_id, "Another worker owns this call, dropping duplicate");
                return;
            }
            Err(err) => {
                tracing::error!(%call_id, %trace_id, error = %err, "Lock attempt failed");
                return;
            }
        }

        let action = match event.action_name() {
            Some(action) => action.to_string(),
            None => {
                tracing::error!(%call_id, %trace_id, "Event carries no dialplan action");
                self.store.unlock(&call_id).await.ok();
                return;
            }
        };

        match action.as_str() {
            ACTION_PROCESS_GUEST_CALL => {
                if let Err(err) = self.resolve_guest(&mut event).await {
                    tracing::error!(%call_id, %trace_id, error = %err, "Guest resolution failed");
                    self.store.unlock(&call_id).await.ok();
                    return;
                }
                self.start_conversation(event).await;
            }
            ACTION_START_AI_CONVERSATION => self.start_conversation(event).await,
            other => {
                tracing::error!(%call_id, %trace_id, action = other, "Unknown dialplan action");
                self.store.unlock(&call_id).await.ok();
            }
        }
    }

    /// Resolve an unmatched caller through the directory and graft the
    /// result onto the event, so the dialog sees a normal matched call.
    async fn resolve_guest(&self, event: &mut CallEvent) -> Result<(), AgentError> {
        let tenant_hint = event
            .dialplan
            .as_ref()
            .and_then(|d| d.inbound_route.as_ref())
            .map(|r| r.tenant_id.clone())
            .filter(|t| !t.is_empty());
        let user = self
            .users
            .find_or_create_guest(&event.trace_id, &event.from_uri, tenant_hint.as_deref())
            .await?;

        let number = parse_caller_number(&event.from_uri);
        let contact = user
            .contacts
            .iter()
            .find(|c| c.contact_value == number)
            .or_else(|| user.contacts.first())
            .cloned();

        let dialplan = event.dialplan.get_or_insert_with(Default::default);
        dialplan.matched_contact = contact.map(contact_from_proto);
        dialplan.matched_user = Some(user_from_proto(user));
        Ok(())
    }

    async fn start_conversation(&self, event: CallEvent) {
        let call_id = event.call_id.clone();
        let trace_id = event.trace_id.clone();

        match self.store.get(&call_id).await {
            Ok(Some(_)) => {
                // A state blob means a dialog already ran (or runs) for this
                // call; the fresh lock only proves the old one expired.
                tracing::warn!(%call_id, %trace_id, "Dialog already exists, dropping duplicate");
                return;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(%call_id, %trace_id, error = %err, "State lookup failed");
                self.store.unlock(&call_id).await.ok();
                return;
            }
        }

        metrics::counter!("agent_events_processed_total").increment(1);
        self.runner
            .run(event, self.root_cancel.child_token())
            .await;
        self.store.unlock(&call_id).await.ok();
    }

    /// Idempotent: repeated `call.ended` deliveries are harmless.
    async fn handle_call_ended(&self, call_id: &str) {
        if let Err(err) = self.store.unlock(call_id).await {
            tracing::warn!(%call_id, error = %err, "Unlock on call end failed");
        }
        if let Err(err) = self.store.delete_state(call_id).await {
            tracing::warn!(%call_id, error = %err, "State cleanup on call end failed");
        }
        tracing::info!(%call_id, "Call ended, state cleaned up");
    }
}

#[async_trait]
impl EventHandler for CallHandler {
    async fn handle(&self, event: CallEvent) {
        match EventType::parse(&event.event_type) {
            Some(EventType::CallStarted) => self.handle_call_started(event).await,
            Some(EventType::CallEnded) => self.handle_call_ended(&event.call_id).await,
            _ => {
                tracing::debug!(event_type = %event.event_type, "Ignoring event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use sentiric_agent_contracts::user::v1::{Contact, User};
    use sentiric_agent_core::CallState;
    use sentiric_agent_persistence::PersistenceError;

    #[derive(Default)]
    struct FakeStore {
        locks: Mutex<HashSet<String>>,
        states: Mutex<HashMap<String, CallState>>,
        deletes: Mutex<u32>,
    }

    #[async_trait]
    impl CallStateStore for FakeStore {
        async fn get(&self, call_id: &str) -> Result<Option<CallState>, PersistenceError> {
            Ok(self.states.lock().unwrap().get(call_id).cloned())
        }

        async fn set(&self, state: &CallState) -> Result<(), PersistenceError> {
            self.states
                .lock()
                .unwrap()
                .insert(state.call_id.clone(), state.clone());
            Ok(())
        }

        async fn try_lock(
            &self,
            call_id: &str,
            _trace_id: &str,
        ) -> Result<bool, PersistenceError> {
            Ok(self.locks.lock().unwrap().insert(call_id.to_string()))
        }

        async fn unlock(&self, call_id: &str) -> Result<(), PersistenceError> {
            self.locks.lock().unwrap().remove(call_id);
            Ok(())
        }

        async fn delete_state(&self, call_id: &str) -> Result<(), PersistenceError> {
            *self.deletes.lock().unwrap() += 1;
            self.states.lock().unwrap().remove(call_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDirectory;

    #[async_trait]
    impl UserDirectory for FakeDirectory {
        async fn find_or_create_guest(
            &self,
            _trace_id: &str,
            from_uri: &str,
            tenant_hint: Option<&str>,
        ) -> Result<User, AgentError> {
            let number = parse_caller_number(from_uri);
            Ok(User {
                id: "guest-1".into(),
                name: None,
                tenant_id: tenant_hint.unwrap_or("sentiric_demo").into(),
                user_type: "caller".into(),
                contacts: vec![Contact {
                    id: 42,
                    user_id: "guest-1".into(),
                    contact_type: "phone".into(),
                    contact_value: number,
                    is_primary: true,
                }],
                preferred_language_code: None,
            })
        }
    }

    #[derive(Default)]
    struct FakeRunner {
        events: Mutex<Vec<CallEvent>>,
    }

    #[async_trait]
    impl CallRunner for FakeRunner {
        async fn run(&self, event: CallEvent, _cancel: CancellationToken) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn handler_with(
        store: Arc<FakeStore>,
        runner: Arc<FakeRunner>,
    ) -> CallHandler {
        CallHandler::new(
            store,
            Arc::new(FakeDirectory),
            runner,
            CancellationToken::new(),
        )
    }

    fn started_event(action: &str) -> CallEvent {
        serde_json::from_str(&format!(
            r#"{{
                "eventType": "call.started",
                "traceId": "t-1",
                "callId": "c-1",
                "from": "sip:905551234567@host",
                "media": {{"caller_rtp_addr": "10.0.0.5:1", "server_rtp_port": 10002}},
                "dialplan": {{
                    "action": {{"action": "{action}"}},
                    "inboundRoute": {{"defaultLanguageCode": "tr", "tenantId": "acme"}}
                }}
            }}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn second_delivery_is_dropped_while_lock_is_held() {
        let store = Arc::new(FakeStore::default());
        let runner = Arc::new(FakeRunner::default());
        let handler = handler_with(store.clone(), runner.clone());

        // Hold the lock as if another worker owns the call.
        store.locks.lock().unwrap().insert("c-1".to_string());
        handler.handle(started_event(ACTION_START_AI_CONVERSATION)).await;

        assert!(runner.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn guest_call_gets_a_directory_identity_before_the_dialog() {
        let store = Arc::new(FakeStore::default());
        let runner = Arc::new(FakeRunner::default());
        let handler = handler_with(store, runner.clone());

        handler.handle(started_event(ACTION_PROCESS_GUEST_CALL)).await;

        let events = runner.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let dialplan = events[0].dialplan.as_ref().unwrap();
        assert_eq!(dialplan.matched_user.as_ref().unwrap().id, "guest-1");
        assert_eq!(dialplan.matched_user.as_ref().unwrap().tenant_id, "acme");
        assert_eq!(dialplan.matched_contact.as_ref().unwrap().id, 42);
        assert_eq!(
            dialplan.matched_contact.as_ref().unwrap().contact_value,
            "905551234567"
        );
    }

    #[tokio::test]
    async fn existing_state_suppresses_a_replayed_start() {
        let store = Arc::new(FakeStore::default());
        let runner = Arc::new(FakeRunner::default());
        let handler = handler_with(store.clone(), runner.clone());

        let event = started_event(ACTION_START_AI_CONVERSATION);
        let state = CallState::new(event.clone(), "acme".into());
        store.set(&state).await.unwrap();

        handler.handle(event).await;
        assert!(runner.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_action_never_reaches_the_dialog() {
        let store = Arc::new(FakeStore::default());
        let runner = Arc::new(FakeRunner::default());
        let handler = handler_with(store.clone(), runner.clone());

        handler.handle(started_event("TRANSFER_TO_HUMAN")).await;

        assert!(runner.events.lock().unwrap().is_empty());
        // The lock is released so a corrected redelivery can proceed.
        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_ended_is_idempotent() {
        let store = Arc::new(FakeStore::default());
        let runner = Arc::new(FakeRunner::default());
        let handler = handler_with(store.clone(), runner);

        let mut ended = started_event(ACTION_START_AI_CONVERSATION);
        ended.event_type = "call.ended".to_string();

        handler.handle(ended.clone()).await;
        handler.handle(ended).await;
        assert_eq!(*store.deletes.lock().unwrap(), 2);
    }
}
