use async_trait::async_trait;
use std::sync::Arc;

use crate::broadcaster::Broadcaster;
use crate::models::{BroadcastEvent, CompletionSummary, MonitoredProduct, ProgressInfo};
use crate::monitor::{EventSink, MonitorOutcome, PriceMonitor};
use crate::session_store::SessionStore;
use crate::utils::error::{AppError, Result};

/// Records each event in the session store and relays it to observers.
pub struct SessionRelay {
    store: SessionStore,
    broadcaster: Broadcaster,
}

impl SessionRelay {
    pub fn new(store: SessionStore, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }
}

#[async_trait]
impl EventSink for SessionRelay {
    async fn emit(&self, event: BroadcastEvent) {
        match &event {
            BroadcastEvent::Progress {
                session_id,
                product,
                completed,
                total,
            } => {
                self.store
                    .update_progress(
                        session_id,
                        ProgressInfo {
                            completed: *completed,
                            total: *total,
                            current_product: product.clone(),
                        },
                    )
                    .await;
            }
            BroadcastEvent::PriceChange {
                session_id,
                price_changes,
            } => {
                self.store.update_price_changes(session_id, price_changes.clone()).await;
            }
            BroadcastEvent::Complete {
                session_id,
                total,
                updated,
                price_changes,
            } => {
                self.store
                    .complete(
                        session_id,
                        CompletionSummary {
                            total: *total,
                            updated: *updated,
                            price_changes: price_changes.clone(),
                        },
                    )
                    .await;
            }
        }

        self.broadcaster.publish(&event).await;
    }
}

/// Ties a monitor to the session store and broadcaster.
#[derive(Clone)]
pub struct MonitorService {
    monitor: Arc<PriceMonitor>,
    store: SessionStore,
    broadcaster: Broadcaster,
}

impl MonitorService {
    pub fn new(monitor: Arc<PriceMonitor>, store: SessionStore, broadcaster: Broadcaster) -> Self {
        Self {
            monitor,
            store,
            broadcaster,
        }
    }

    pub fn monitor(&self) -> &Arc<PriceMonitor> {
        &self.monitor
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Runs one pass under `session_id`. A launch failure is recorded as the
    /// session's error before being returned.
    ///
    /// The pass runs on its own task, so dropping the returned future (a caller
    /// that went away) leaves it running to completion in the store.
    pub async fn run_session(&self, products: &[MonitoredProduct], session_id: &str) -> Result<MonitorOutcome> {
        let service = self.clone();
        let products = products.to_vec();
        let id = session_id.to_string();

        let pass = tokio::spawn(async move { service.run_attached(&products, &id).await });

        match pass.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Monitoring task aborted");
                self.store.set_error(session_id, format!("Monitoring task aborted: {}", e)).await;
                Err(AppError::Internal(format!("Monitoring task aborted: {}", e)))
            }
        }
    }

    async fn run_attached(&self, products: &[MonitoredProduct], session_id: &str) -> Result<MonitorOutcome> {
        let relay = SessionRelay::new(self.store.clone(), self.broadcaster.clone());

        match self.monitor.run(products, session_id, &relay).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if matches!(e, AppError::EngineLaunch(_)) {
                    self.store.set_error(session_id, e.to_string()).await;
                }
                Err(e)
            }
        }
    }
}
