use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::ExtractionResult;

/// One `{price, date}` point in a product's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceHistoryEntry {
    pub price: Decimal,
    #[serde(rename = "date", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// A competitor product as held by the catalog. The monitor only ever works
/// on a transient copy for the duration of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredProduct {
    #[serde(default)]
    pub id: String,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    #[serde(default)]
    pub competitor_name: String,
    #[validate(url(message = "Product URL must be a valid URL"))]
    pub url: String,
    #[validate(custom(function = "validate_non_negative"))]
    pub current_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_price: Option<Decimal>,
    #[serde(default)]
    pub is_on_offer: bool,
    #[serde(default)]
    pub original_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub price_history: Vec<PriceHistoryEntry>,
}

fn validate_non_negative(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = ValidationError::new("negative_price");
        err.message = Some("Current price cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

impl MonitoredProduct {
    /// Copy of this product carrying a fresh reading.
    pub fn with_reading(&self, reading: &ExtractionResult, checked_at: DateTime<Utc>) -> Self {
        Self {
            new_price: Some(reading.new_price),
            is_on_offer: reading.is_on_offer,
            original_price: reading.original_price,
            last_checked: Some(checked_at),
            ..self.clone()
        }
    }

    pub fn price_changed(&self, new_price: Decimal) -> bool {
        self.current_price != new_price
    }

    /// History with `price` appended. The new point never predates the last
    /// recorded one, so history stays ordered even with a skewed clock.
    pub fn history_with(&self, price: Decimal, at: DateTime<Utc>) -> Vec<PriceHistoryEntry> {
        let mut history = self.price_history.clone();
        let timestamp = match history.last() {
            Some(last) if last.timestamp > at => last.timestamp,
            _ => at,
        };
        history.push(PriceHistoryEntry { price, timestamp });
        history
    }
}
