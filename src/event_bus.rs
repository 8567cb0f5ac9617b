//! Broadcast bus for scenario lifecycle and error events.
//!
//! Observers subscribe for load/reload outcomes and turn-level faults;
//! nothing in the dialog path waits on a subscriber.

use tokio::sync::broadcast;

use crate::loader::LoadReport;

#[derive(thiserror::Error, Debug, Clone)]
pub enum EventError {
    #[error("event send failed: {message}")]
    SendFailed { message: String },
    #[error("event receive failed: {message}")]
    ReceiveFailed { message: String },
    #[error("receiver lagged, {count} events dropped")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioEvent {
    /// A load cycle produced a new dialog table.
    Loaded {
        dialogs: Vec<String>,
        skipped: usize,
    },
    /// A load cycle failed; the previous table stays in service.
    LoadFailed { message: String },
    DialogStarted {
        conversation: String,
        dialog: String,
    },
    DialogFinished { conversation: String },
}

impl ScenarioEvent {
    pub fn loaded(report: &LoadReport) -> Self {
        ScenarioEvent::Loaded {
            dialogs: report.dialogs.clone(),
            skipped: report.skipped.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub error_type: String,
    pub message: String,
}

pub struct EventBus {
    event_sender: broadcast::Sender<ScenarioEvent>,
    error_sender: broadcast::Sender<ErrorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity);
        let (error_sender, _) = broadcast::channel(capacity);
        Self {
            event_sender,
            error_sender,
        }
    }

    pub fn subscribe(&self) -> (EventReceiver, ErrorReceiver) {
        (
            EventReceiver::new(self.event_sender.subscribe()),
            ErrorReceiver::new(self.error_sender.subscribe()),
        )
    }

    /// Publishing with no subscribers is not an error; the event is
    /// simply dropped.
    pub fn publish(&self, event: ScenarioEvent) {
        let _ = self.event_sender.send(event);
    }

    pub fn publish_error(&self, error: ErrorEvent) {
        let _ = self.error_sender.send(error);
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<ScenarioEvent>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<ScenarioEvent>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lag the receiver resubscribes so the
    /// next call observes the live stream, and reports how much was lost.
    pub async fn recv(&mut self) -> EventResult<ScenarioEvent> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }
}

pub struct ErrorReceiver {
    receiver: broadcast::Receiver<ErrorEvent>,
}

impl ErrorReceiver {
    fn new(receiver: broadcast::Receiver<ErrorEvent>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> EventResult<ErrorEvent> {
        self.receiver.recv().await.map_err(|e| EventError::ReceiveFailed {
            message: e.to_string(),
        })
    }
}
