use metrics::gauge;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::models::BroadcastEvent;

#[derive(Debug, Error)]
#[error("observer disconnected")]
pub struct DeliveryError;

/// A connected subscriber. A delivery error means the connection is gone.
pub trait Observer: Send + Sync {
    fn deliver(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Events an observer may have queued before it counts as stalled.
pub const OBSERVER_BUFFER: usize = 256;

/// Observer backed by a bounded channel drained by a transport task. A full
/// queue means the client stopped reading and is treated as disconnected.
pub struct ChannelObserver {
    sender: mpsc::Sender<String>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    pub fn pair() -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(OBSERVER_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        self.sender.try_send(message.to_string()).map_err(|_| DeliveryError)
    }
}

/// Registry of currently connected observers. Every published event goes to
/// every observer present at publish time; there is no replay.
#[derive(Clone, Default)]
pub struct Broadcaster {
    observers: Arc<Mutex<HashMap<Uuid, Arc<dyn Observer>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, observer: Arc<dyn Observer>) -> Uuid {
        let id = Uuid::new_v4();
        let mut observers = self.observers.lock().await;
        observers.insert(id, observer);
        gauge!("price_sentinel_observers").set(observers.len() as f64);
        tracing::debug!(observer_id = %id, connected = observers.len(), "Observer registered");
        id
    }

    /// Removing an unknown observer is a no-op.
    pub async fn unregister(&self, id: Uuid) {
        let mut observers = self.observers.lock().await;
        if observers.remove(&id).is_some() {
            gauge!("price_sentinel_observers").set(observers.len() as f64);
            tracing::debug!(observer_id = %id, connected = observers.len(), "Observer removed");
        }
    }

    /// Serializes the event once and hands it to every observer, dropping
    /// those whose delivery fails. Returns how many observers received it.
    pub async fn publish(&self, event: &BroadcastEvent) -> usize {
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(kind = event.kind(), error = %e, "Failed to serialize broadcast event");
                return 0;
            }
        };

        let mut observers = self.observers.lock().await;
        let before = observers.len();
        observers.retain(|_, observer| observer.deliver(&message).is_ok());

        if observers.len() != before {
            gauge!("price_sentinel_observers").set(observers.len() as f64);
            tracing::debug!(dropped = before - observers.len(), "Dropped disconnected observers");
        }
        observers.len()
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.lock().await.len()
    }
}
