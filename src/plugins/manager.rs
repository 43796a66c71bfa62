use async_trait::async_trait;
use std::sync::Arc;

use super::notifiers::{EmailNotifier, WebhookNotifier};
use super::traits::{ChangeNotifier, NotificationResult};
use crate::config::AppConfig;
use crate::models::PriceChangeRecord;
use crate::utils::error::{AppError, Result};

pub type NotifierBox = Arc<dyn ChangeNotifier>;

/// Fans one alert out to every configured notifier.
#[derive(Clone, Default)]
pub struct NotifierManager {
    notifiers: Vec<NotifierBox>,
}

impl NotifierManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: NotifierBox) {
        tracing::debug!(notifier = notifier.name(), "Registered change notifier");
        self.notifiers.push(notifier);
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.notifiers.iter().map(|n| n.name().to_string()).collect()
    }

    /// Builds the notifiers the configuration enables. `None` when nothing
    /// is configured, in which case alerts are skipped.
    pub fn from_config(config: &AppConfig) -> Result<Option<NotifierBox>> {
        let mut manager = Self::new();
        let notifications = &config.notifications;

        if notifications.smtp.is_configured() {
            let email = EmailNotifier::new(
                notifications.smtp.clone(),
                &config.scraper.currency_code,
                notifications.app_url.as_deref(),
            )?;
            manager.register(Arc::new(email));
        }

        if let Some(webhook_url) = &notifications.webhook_url {
            manager.register(Arc::new(WebhookNotifier::new(webhook_url)?));
        }

        if manager.is_empty() {
            tracing::info!("No change notifier configured; alerts will be skipped");
            return Ok(None);
        }

        Ok(Some(Arc::new(manager)))
    }
}

#[async_trait]
impl ChangeNotifier for NotifierManager {
    fn name(&self) -> &str {
        "all"
    }

    /// Succeeds when at least one notifier delivered.
    async fn notify(&self, price_changes: &[PriceChangeRecord]) -> Result<NotificationResult> {
        let mut errors = Vec::new();
        let mut delivered = None;

        for notifier in &self.notifiers {
            match notifier.notify(price_changes).await {
                Ok(result) => {
                    delivered.get_or_insert(result);
                }
                Err(e) => {
                    tracing::warn!(notifier = notifier.name(), error = %e, "Notifier failed");
                    errors.push(format!("{}: {}", notifier.name(), e));
                }
            }
        }

        match delivered {
            Some(mut result) => {
                if !errors.is_empty() {
                    result.error = Some(errors.join("; "));
                }
                Ok(result)
            }
            None if errors.is_empty() => Err(AppError::Notification("No notifiers registered".to_string())),
            None => Err(AppError::Notification(errors.join("; "))),
        }
    }
}
