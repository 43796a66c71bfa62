use serde::{Deserialize, Serialize};

use crate::models::PriceChangeRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInfo {
    pub completed: usize,
    pub total: usize,
    /// Product being checked right now; absent once the pass is done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_product: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub total: usize,
    pub updated: usize,
    pub price_changes: Vec<PriceChangeRecord>,
}

/// Live state of one monitoring session. Every field is optional so an
/// unknown session reads as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_changes: Option<Vec<PriceChangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<CompletionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionStatus {
    pub fn is_empty(&self) -> bool {
        self.progress.is_none()
            && self.price_changes.is_none()
            && self.complete.is_none()
            && self.error.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.complete.is_some() || self.error.is_some()
    }
}
