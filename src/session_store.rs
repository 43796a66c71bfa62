use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::models::{CompletionSummary, PriceChangeRecord, ProgressInfo, SessionStatus};

#[derive(Debug, Clone)]
struct Entry {
    status: SessionStatus,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Live status of monitoring sessions. Finished sessions (completed or
/// errored) expire after the retention window; expired entries read as an
/// empty status.
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    retention: Duration,
}

impl SessionStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Snapshot of the session, `{}` when unknown or expired.
    pub async fn get(&self, session_id: &str) -> SessionStatus {
        let mut entries = self.entries.lock().await;
        match entries.get(session_id) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(session_id);
                SessionStatus::default()
            }
            Some(entry) => entry.status.clone(),
            None => SessionStatus::default(),
        }
    }

    pub async fn update_progress(&self, session_id: &str, progress: ProgressInfo) {
        self.merge(session_id, None, |status| status.progress = Some(progress)).await;
    }

    pub async fn update_price_changes(&self, session_id: &str, price_changes: Vec<PriceChangeRecord>) {
        self.merge(session_id, None, |status| status.price_changes = Some(price_changes))
            .await;
    }

    pub async fn complete(&self, session_id: &str, summary: CompletionSummary) {
        let expires_at = Instant::now() + self.retention;
        self.merge(session_id, Some(expires_at), |status| status.complete = Some(summary))
            .await;
        tracing::debug!(session_id, "Session complete; expiry armed");
    }

    pub async fn set_error(&self, session_id: &str, error: impl Into<String>) {
        let expires_at = Instant::now() + self.retention;
        let error = error.into();
        self.merge(session_id, Some(expires_at), |status| status.error = Some(error))
            .await;
    }

    /// Applies `update` to a copy of the current status and swaps the entry
    /// in one step, creating it when absent.
    async fn merge<F>(&self, session_id: &str, expires_at: Option<Instant>, update: F)
    where
        F: FnOnce(&mut SessionStatus),
    {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let mut entry = match entries.remove(session_id) {
            Some(entry) if !entry.is_expired(now) => entry,
            _ => Entry {
                status: SessionStatus::default(),
                expires_at: None,
            },
        };

        update(&mut entry.status);
        if expires_at.is_some() {
            entry.expires_at = expires_at;
        }
        entries.insert(session_id.to_string(), entry);
    }

    /// Drops every expired session, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Runs `purge_expired` every `interval` until the handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Expired sessions removed");
                }
            }
        })
    }
}
