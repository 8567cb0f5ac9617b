//! System facade: scenario loading, hot reload, and message dispatch.
//!
//! The system owns one current [`DialogTable`] behind a `RwLock<Arc<..>>`.
//! A reload builds the replacement table completely off to the side and
//! swaps the `Arc`, so readers only ever observe a whole generation.
//! Conversations pin the table they started their dialog under and keep
//! walking it until they drain; the pin is refreshed whenever the
//! conversation goes idle, so new dialogs always start on the newest
//! table while in-flight ones finish coherently on theirs.
//!
//! Turn faults (a hook dividing by zero, a dialog vanishing mid-reload)
//! never surface to the channel as errors: the conversation is reset, an
//! apology reply is returned, and the fault goes out on the error event
//! channel for observers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::SystemConfig;
use crate::event_bus::{ErrorEvent, ErrorReceiver, EventBus, EventReceiver, ScenarioEvent};
use crate::loader::{self, DialogTable, LoadReport};
use crate::runtime::{Conversation, OutboundMessage, TurnReply};
use crate::store::ScenarioStore;
use crate::InternalResult;

struct Session {
    conversation: Conversation,
    /// Table generation this session's current dialog runs against.
    table: Arc<DialogTable>,
}

pub struct System {
    config: SystemConfig,
    store: Arc<dyn ScenarioStore>,
    table: RwLock<Arc<DialogTable>>,
    conversations: DashMap<String, Arc<Mutex<Session>>>,
    event_bus: EventBus,
    last_load_error: RwLock<Option<String>>,
}

impl System {
    /// Creates a system with an empty table; call [`System::reload`] to
    /// load the first generation of scenarios.
    pub fn new(config: SystemConfig, store: Arc<dyn ScenarioStore>) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        Self {
            config,
            store,
            table: RwLock::new(Arc::new(DialogTable::default())),
            conversations: DashMap::new(),
            event_bus,
            last_load_error: RwLock::new(None),
        }
    }

    /// Loads (or reloads) every stored scenario into a fresh table and
    /// swaps it in atomically. On failure the previous table stays in
    /// service and the error is retained for inspection.
    pub async fn reload(&self) -> InternalResult<LoadReport> {
        let result = async {
            let documents = self.store.load().await?;
            let (table, report) = loader::build_from_documents(&documents)?;
            Ok::<_, crate::Error>((table, report))
        }
        .await;

        match result {
            Ok((table, report)) => {
                *self.table.write().await = Arc::new(table);
                *self.last_load_error.write().await = None;
                info!("scenario table swapped: {} root dialogs", report.dialogs.len());
                self.event_bus.publish(ScenarioEvent::loaded(&report));
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                warn!("scenario load failed, keeping previous table: {}", message);
                *self.last_load_error.write().await = Some(message.clone());
                self.event_bus
                    .publish(ScenarioEvent::LoadFailed { message });
                Err(e)
            }
        }
    }

    /// Handles one inbound message for one conversation. The reply is
    /// always `Ok`: faults are converted to the apology reply after
    /// resetting the conversation.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> InternalResult<TurnReply> {
        let session = self.session(conversation_id).await;
        let mut session = session.lock().await;

        // refresh the table pin only between dialogs
        if session.conversation.is_idle() {
            session.table = self.table.read().await.clone();
        }
        let table = session.table.clone();

        let result = if session.conversation.is_awaiting_input() {
            session.conversation.resume(&table, text)
        } else {
            match table.dispatcher.resolve(text) {
                Some(dialog) => {
                    let dialog = dialog.to_string();
                    self.event_bus.publish(ScenarioEvent::DialogStarted {
                        conversation: conversation_id.to_string(),
                        dialog: dialog.clone(),
                    });
                    session.conversation.begin(&table, &dialog)
                }
                None => {
                    return Ok(TurnReply {
                        messages: vec![plain_reply(&self.config.default_reply)],
                        finished: true,
                    });
                }
            }
        };

        match result {
            Ok(reply) => {
                if reply.finished {
                    self.event_bus.publish(ScenarioEvent::DialogFinished {
                        conversation: conversation_id.to_string(),
                    });
                }
                Ok(reply)
            }
            Err(e) => {
                error!("turn failed for conversation {:?}: {}", conversation_id, e);
                self.event_bus.publish_error(ErrorEvent {
                    error_type: "turn".to_string(),
                    message: e.to_string(),
                });
                session.conversation.reset();
                Ok(TurnReply {
                    messages: vec![plain_reply(&self.config.apology_reply)],
                    finished: true,
                })
            }
        }
    }

    async fn session(&self, conversation_id: &str) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.conversations.get(conversation_id) {
            return existing.value().clone();
        }
        let table = self.table.read().await.clone();
        self.conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session {
                    conversation: Conversation::new(self.config.max_depth),
                    table,
                }))
            })
            .value()
            .clone()
    }

    pub fn remove_conversation(&self, conversation_id: &str) {
        self.conversations.remove(conversation_id);
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub async fn last_load_error(&self) -> Option<String> {
        self.last_load_error.read().await.clone()
    }

    pub async fn dialog_names(&self) -> Vec<String> {
        self.table.read().await.registry.names()
    }

    pub fn subscribe(&self) -> (EventReceiver, ErrorReceiver) {
        self.event_bus.subscribe()
    }
}

fn plain_reply(text: &str) -> OutboundMessage {
    OutboundMessage {
        text: text.to_string(),
        attachments: Vec::new(),
        input: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, StoreError, StoreResult};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    struct StaticStore {
        documents: StdMutex<StoreResult<Vec<Document>>>,
    }

    impl StaticStore {
        fn new(documents: Vec<Document>) -> Arc<Self> {
            Arc::new(Self {
                documents: StdMutex::new(Ok(documents)),
            })
        }

        fn set(&self, documents: Vec<Document>) {
            *self.documents.lock().unwrap() = Ok(documents);
        }

        fn fail(&self) {
            *self.documents.lock().unwrap() =
                Err(StoreError::MissingDirectory("/gone".into()));
        }
    }

    #[async_trait]
    impl ScenarioStore for StaticStore {
        async fn load(&self) -> StoreResult<Vec<Document>> {
            match &*self.documents.lock().unwrap() {
                Ok(docs) => Ok(docs.clone()),
                Err(_) => Err(StoreError::MissingDirectory("/gone".into())),
            }
        }
    }

    fn greet_document(reply: &str) -> Document {
        let code = format!(
            r#"{{
                "name": "greeting",
                "intent": "^hi",
                "steps": [
                    {{ "type": "prompt", "text": "What is your name?", "variable": "name" }},
                    {{ "type": "statement", "text": "{}" }}
                ]
            }}"#,
            reply
        );
        Document {
            name: "greet.json".to_string(),
            text: format!(
                r#"{{ "name": "greet", "code": {} }}"#,
                serde_json::to_string(&code).unwrap()
            ),
        }
    }

    async fn system_with(documents: Vec<Document>) -> (System, Arc<StaticStore>) {
        let store = StaticStore::new(documents);
        let system = System::new(SystemConfig::default(), store.clone());
        system.reload().await.unwrap();
        (system, store)
    }

    #[tokio::test]
    async fn test_full_conversation_flow() {
        let (system, _) = system_with(vec![greet_document("Hello ${name}")]).await;

        let reply = system.handle_message("c1", "hi there").await.unwrap();
        assert_eq!(reply.messages[0].text, "What is your name?");
        assert!(!reply.finished);

        let reply = system.handle_message("c1", "Sam").await.unwrap();
        assert_eq!(reply.messages[0].text, "Hello Sam");
        assert!(reply.finished);
    }

    #[tokio::test]
    async fn test_unmatched_text_gets_default_reply() {
        let (system, _) = system_with(vec![greet_document("Hello ${name}")]).await;
        let reply = system.handle_message("c1", "nonsense").await.unwrap();
        assert_eq!(
            reply.messages[0].text,
            SystemConfig::default().default_reply
        );
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_table() {
        let (system, store) = system_with(vec![greet_document("Hello ${name}")]).await;

        store.fail();
        assert!(system.reload().await.is_err());
        assert!(system.last_load_error().await.is_some());

        // previous generation still serves
        let reply = system.handle_message("c1", "hi").await.unwrap();
        assert_eq!(reply.messages[0].text, "What is your name?");

        store.set(vec![greet_document("Hello ${name}")]);
        system.reload().await.unwrap();
        assert!(system.last_load_error().await.is_none());
    }

    #[tokio::test]
    async fn test_in_flight_conversation_finishes_on_its_table() {
        let (system, store) = system_with(vec![greet_document("Hello ${name}")]).await;

        system.handle_message("c1", "hi").await.unwrap();

        store.set(vec![greet_document("Welcome ${name}")]);
        system.reload().await.unwrap();

        // c1 started before the swap and finishes on the old generation
        let reply = system.handle_message("c1", "Sam").await.unwrap();
        assert_eq!(reply.messages[0].text, "Hello Sam");

        // a fresh dialog picks up the new generation
        let reply = system.handle_message("c2", "hi").await.unwrap();
        assert!(!reply.finished);
        let reply = system.handle_message("c2", "Ada").await.unwrap();
        assert_eq!(reply.messages[0].text, "Welcome Ada");
    }

    #[tokio::test]
    async fn test_turn_fault_resets_with_apology() {
        let code = r#"{
            "name": "faulty",
            "intent": "boom",
            "steps": [
                { "type": "prompt", "text": "?", "variable": "x", "onInit": "1 / 0" }
            ]
        }"#;
        let document = Document {
            name: "faulty.json".to_string(),
            text: format!(
                r#"{{ "name": "faulty", "code": {} }}"#,
                serde_json::to_string(code).unwrap()
            ),
        };
        let (system, _) = system_with(vec![document]).await;
        let (_, mut error_rx) = system.subscribe();

        let reply = system.handle_message("c1", "boom").await.unwrap();
        assert_eq!(
            reply.messages[0].text,
            SystemConfig::default().apology_reply
        );
        assert!(reply.finished);
        assert_eq!(error_rx.recv().await.unwrap().error_type, "turn");

        // conversation is usable again
        let reply = system.handle_message("c1", "anything").await.unwrap();
        assert_eq!(
            reply.messages[0].text,
            SystemConfig::default().default_reply
        );
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_published() {
        let (system, _) = system_with(vec![greet_document("Hello ${name}")]).await;
        let (mut event_rx, _) = system.subscribe();

        system.handle_message("c1", "hi").await.unwrap();
        assert_eq!(
            event_rx.recv().await.unwrap(),
            ScenarioEvent::DialogStarted {
                conversation: "c1".to_string(),
                dialog: "greeting".to_string()
            }
        );

        system.handle_message("c1", "Sam").await.unwrap();
        assert_eq!(
            event_rx.recv().await.unwrap(),
            ScenarioEvent::DialogFinished {
                conversation: "c1".to_string()
            }
        );
    }
}
