//! Session event stream.
//!
//! [`EventBus`] is a composed fan-out: an internal subscriber list plus
//! [`EventBus::publish`]. Each subscriber owns an unbounded queue, so
//! publishing never blocks the caller and every subscriber observes events in
//! publish order. Subscribers whose receiver has been dropped are pruned on
//! the next publish.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::media::MediaStream;
use crate::session::SessionState;

/// Something the session wants its embedder to know about.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The lifecycle state changed.
    State(SessionState),
    /// One voice-activity sample. Emitted on every tick, changed or not.
    VoiceActivity { speaking: bool },
    /// The scenario moved to a step.
    Step { index: usize, step_id: String },
    /// `advance` was called on the last step.
    ScenarioComplete,
    /// The remote peer delivered its media stream.
    RemoteStream(MediaStream),
}

/// Ordered multi-subscriber publisher. Cheap to clone; clones share
/// subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. It sees events published after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push(tx);
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("event bus lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
