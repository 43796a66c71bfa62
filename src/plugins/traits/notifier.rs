use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::PriceChangeRecord;
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }
}

/// One-shot alert dispatch for the price changes of a monitoring pass.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, price_changes: &[PriceChangeRecord]) -> Result<NotificationResult>;
}
