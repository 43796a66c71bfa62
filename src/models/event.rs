use serde::{Deserialize, Serialize};

use crate::models::PriceChangeRecord;

/// Event relayed to live observers, tagged on the wire as
/// `{"type": "progress" | "priceChange" | "complete", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    #[serde(rename = "progress", rename_all = "camelCase")]
    Progress {
        session_id: String,
        /// Name of the product about to be checked.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        product: Option<String>,
        completed: usize,
        total: usize,
    },
    #[serde(rename = "priceChange", rename_all = "camelCase")]
    PriceChange {
        session_id: String,
        price_changes: Vec<PriceChangeRecord>,
    },
    #[serde(rename = "complete", rename_all = "camelCase")]
    Complete {
        session_id: String,
        total: usize,
        updated: usize,
        price_changes: Vec<PriceChangeRecord>,
    },
}

impl BroadcastEvent {
    pub fn session_id(&self) -> &str {
        match self {
            BroadcastEvent::Progress { session_id, .. }
            | BroadcastEvent::PriceChange { session_id, .. }
            | BroadcastEvent::Complete { session_id, .. } => session_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastEvent::Progress { .. } => "progress",
            BroadcastEvent::PriceChange { .. } => "priceChange",
            BroadcastEvent::Complete { .. } => "complete",
        }
    }
}
