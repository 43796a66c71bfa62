use crate::models::PriceChangeRecord;
use crate::plugins::traits::{ChangeNotifier, NotificationResult};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    price_changes: &'a [PriceChangeRecord],
}

/// POSTs `{"priceChanges": [...]}` to an alerting endpoint.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: &str) -> Result<Self> {
        url::Url::parse(webhook_url)
            .map_err(|e| AppError::Validation(format!("Invalid webhook URL '{}': {}", webhook_url, e)))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(WebhookNotifier {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl ChangeNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, price_changes: &[PriceChangeRecord]) -> Result<NotificationResult> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&WebhookPayload { price_changes })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        tracing::info!(count = price_changes.len(), "Price change webhook delivered");
        Ok(NotificationResult::delivered(Some(format!(
            "webhook-{}",
            chrono::Utc::now().timestamp()
        ))))
    }
}
