use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::catalog::{PriceUpdate, ProductCatalog};
use crate::config::MonitorConfig;
use crate::models::{BroadcastEvent, MonitoredProduct, PriceChangeRecord};
use crate::plugins::ChangeNotifier;
use crate::scraper::EngineLauncher;
use crate::utils::error::Result;

/// Receives the events of one monitoring pass as they happen.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: BroadcastEvent);
}

/// Sink that drops every event, for passes nobody watches.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: BroadcastEvent) {}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorOutcome {
    pub updated_products: Vec<MonitoredProduct>,
    pub price_changes: Vec<PriceChangeRecord>,
    /// Products skipped because no price could be read.
    #[serde(skip)]
    pub failed: usize,
}

/// Awaits a collaborator call whose failure must not affect the pass: the
/// error is logged and `None` returned.
pub async fn best_effort<T, F>(operation: &str, call: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match call.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, error = %e, "Collaborator call failed; continuing");
            counter!("price_sentinel_collaborator_failures_total", "operation" => operation.to_string())
                .increment(1);
            None
        }
    }
}

/// Runs monitoring passes: one browser engine per pass, products checked one
/// at a time in input order.
pub struct PriceMonitor {
    launcher: Arc<dyn EngineLauncher>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    config: MonitorConfig,
}

impl PriceMonitor {
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: MonitorConfig) -> Self {
        Self {
            launcher,
            notifier: None,
            catalog: None,
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn catalog(&self) -> Option<&Arc<dyn ProductCatalog>> {
        self.catalog.as_ref()
    }

    /// Checks every product and reports through `sink`. Only a failure to
    /// start the browser engine is returned as an error; per-product
    /// failures are logged and the product left out of the outcome.
    pub async fn run(
        &self,
        products: &[MonitoredProduct],
        session_id: &str,
        sink: &dyn EventSink,
    ) -> Result<MonitorOutcome> {
        let start_time = Instant::now();
        let total = products.len();

        let mut session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => {
                counter!("price_sentinel_runs_total", "outcome" => "launch_failed").increment(1);
                tracing::error!(session_id, error = %e, "Browser engine failed to launch");
                return Err(e);
            }
        };

        tracing::info!(session_id, total, "Monitoring pass started");
        let mut outcome = MonitorOutcome::default();

        for (index, product) in products.iter().enumerate() {
            if index > 0 && !self.config.inter_product_delay().is_zero() {
                tokio::time::sleep(self.config.inter_product_delay()).await;
            }

            sink.emit(BroadcastEvent::Progress {
                session_id: session_id.to_string(),
                product: Some(product.name.clone()),
                completed: index,
                total,
            })
            .await;

            let reading = match session.extract(&product.url).await {
                Ok(reading) => {
                    counter!("price_sentinel_extractions_total", "outcome" => "success").increment(1);
                    reading
                }
                Err(e) => {
                    let outcome_label = if e.is_per_item() { "failed" } else { "error" };
                    counter!("price_sentinel_extractions_total", "outcome" => outcome_label).increment(1);
                    tracing::warn!(
                        session_id,
                        product = %product.name,
                        url = %product.url,
                        error = %e,
                        "Skipping product without a price reading"
                    );
                    outcome.failed += 1;
                    continue;
                }
            };

            let updated = product.with_reading(&reading, Utc::now());
            outcome.updated_products.push(updated);

            if let Some(change) = PriceChangeRecord::detect(product, &reading) {
                tracing::info!(
                    session_id,
                    product = %product.name,
                    old_price = %change.old_price,
                    new_price = %change.new_price,
                    "Price change detected"
                );
                counter!("price_sentinel_price_changes_total").increment(1);
                outcome.price_changes.push(change);

                sink.emit(BroadcastEvent::PriceChange {
                    session_id: session_id.to_string(),
                    price_changes: outcome.price_changes.clone(),
                })
                .await;
            }
        }

        if let Err(e) = session.shutdown().await {
            tracing::warn!(session_id, error = %e, "Browser engine did not shut down cleanly");
        }

        sink.emit(BroadcastEvent::Progress {
            session_id: session_id.to_string(),
            product: None,
            completed: total,
            total,
        })
        .await;

        if !outcome.price_changes.is_empty() {
            self.notify(session_id, &outcome.price_changes).await;
        }
        self.write_back(session_id, &outcome.updated_products).await;

        sink.emit(BroadcastEvent::Complete {
            session_id: session_id.to_string(),
            total,
            updated: outcome.updated_products.len(),
            price_changes: outcome.price_changes.clone(),
        })
        .await;

        counter!("price_sentinel_runs_total", "outcome" => "completed").increment(1);
        histogram!("price_sentinel_run_duration_seconds").record(start_time.elapsed().as_secs_f64());
        tracing::info!(
            session_id,
            total,
            updated = outcome.updated_products.len(),
            changes = outcome.price_changes.len(),
            failed = outcome.failed,
            "Monitoring pass complete"
        );

        Ok(outcome)
    }

    async fn notify(&self, session_id: &str, price_changes: &[PriceChangeRecord]) {
        match &self.notifier {
            Some(notifier) => {
                if best_effort("notify", notifier.notify(price_changes)).await.is_some() {
                    tracing::info!(session_id, notifier = notifier.name(), "Price change alert sent");
                }
            }
            None => {
                tracing::info!(session_id, count = price_changes.len(), "No notifier configured; alert skipped");
            }
        }
    }

    /// Writes changed prices back to the catalog, one product at a time.
    async fn write_back(&self, session_id: &str, updated_products: &[MonitoredProduct]) {
        let Some(catalog) = &self.catalog else {
            return;
        };

        let now = Utc::now();
        for product in updated_products {
            let Some(new_price) = product.new_price else {
                continue;
            };
            if !product.price_changed(new_price) {
                continue;
            }
            let Some(update) = PriceUpdate::from_product(product, now) else {
                continue;
            };

            if best_effort("catalog_update", catalog.update_product(&update)).await.is_some() {
                tracing::debug!(session_id, product = %product.name, "Catalog price updated");
            }
        }
    }
}
