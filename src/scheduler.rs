use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::models::generate_session_id;
use crate::monitor::MonitorOutcome;
use crate::session_relay::MonitorService;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed_passes: u64,
    pub failed_passes: u64,
    pub skipped_passes: u64,
    pub last_session_id: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
}

/// Runs catalog-wide monitoring passes on a cron schedule.
pub struct MonitorScheduler {
    scheduler: JobScheduler,
    service: MonitorService,
    config: SchedulerConfig,
    stats: Arc<RwLock<SchedulerStats>>,
    running: Arc<AtomicBool>,
    job_id: Option<Uuid>,
}

impl MonitorScheduler {
    pub async fn new(service: MonitorService, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            service,
            config,
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            running: Arc::new(AtomicBool::new(false)),
            job_id: None,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("Scheduled monitoring disabled");
            return Ok(());
        }

        let service = self.service.clone();
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _l| {
            let service = service.clone();
            let stats = Arc::clone(&stats);
            let running = Arc::clone(&running);

            Box::pin(async move {
                Self::execute_pass(&service, &stats, &running).await;
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;
        tracing::info!(cron = %self.config.cron, "Monitor scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }
        self.scheduler.shutdown().await?;
        tracing::info!("Monitor scheduler shutdown");
        Ok(())
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    /// Runs one pass now, outside the schedule.
    pub async fn trigger(&self) -> Option<MonitorOutcome> {
        Self::execute_pass(&self.service, &self.stats, &self.running).await
    }

    /// A pass is skipped while the previous one is still running or when
    /// the catalog cannot be read.
    async fn execute_pass(
        service: &MonitorService,
        stats: &RwLock<SchedulerStats>,
        running: &AtomicBool,
    ) -> Option<MonitorOutcome> {
        if running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous monitoring pass still running; skipping");
            stats.write().await.skipped_passes += 1;
            return None;
        }

        let result = Self::run_catalog_pass(service).await;
        running.store(false, Ordering::SeqCst);

        let mut stats = stats.write().await;
        stats.last_run = Some(Utc::now());
        match result {
            PassResult::Completed(session_id, outcome) => {
                stats.completed_passes += 1;
                stats.last_session_id = Some(session_id);
                Some(outcome)
            }
            PassResult::Failed(session_id) => {
                stats.failed_passes += 1;
                stats.last_session_id = Some(session_id);
                None
            }
            PassResult::Skipped => {
                stats.skipped_passes += 1;
                None
            }
        }
    }

    async fn run_catalog_pass(service: &MonitorService) -> PassResult {
        let Some(catalog) = service.monitor().catalog() else {
            tracing::warn!("Scheduled pass skipped: no catalog configured");
            return PassResult::Skipped;
        };

        let products = match catalog.list_products().await {
            Ok(products) => products,
            Err(e) => {
                tracing::error!(error = %e, "Scheduled pass skipped: catalog unavailable");
                return PassResult::Skipped;
            }
        };

        let session_id = generate_session_id();
        tracing::info!(session_id = %session_id, products = products.len(), "Scheduled monitoring pass");

        match service.run_session(&products, &session_id).await {
            Ok(outcome) => PassResult::Completed(session_id, outcome),
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Scheduled pass failed");
                PassResult::Failed(session_id)
            }
        }
    }
}

enum PassResult {
    Completed(String, MonitorOutcome),
    Failed(String),
    Skipped,
}
