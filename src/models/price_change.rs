use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::MonitoredProduct;

/// A price reading taken from one product page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub new_price: Decimal,
    pub is_on_offer: bool,
    pub original_price: Option<Decimal>,
}

impl ExtractionResult {
    pub fn regular(price: Decimal) -> Self {
        Self {
            new_price: price,
            is_on_offer: false,
            original_price: None,
        }
    }

    pub fn offer(price: Decimal, original_price: Option<Decimal>) -> Self {
        Self {
            new_price: price,
            is_on_offer: true,
            original_price,
        }
    }
}

/// The delta between a product's known price and a fresh reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceChangeRecord {
    #[serde(alias = "id")]
    pub product_id: String,
    pub name: String,
    pub url: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub difference: Decimal,
    /// Two-decimal percentage as text, `None` when the old price was zero or
    /// too small for the ratio to be representable.
    pub percentage_change: Option<String>,
    pub is_on_offer: bool,
    pub original_price: Option<Decimal>,
}

impl PriceChangeRecord {
    /// Builds a record when the reading differs from the product's current
    /// price, `None` otherwise.
    pub fn detect(product: &MonitoredProduct, reading: &ExtractionResult) -> Option<Self> {
        if !product.price_changed(reading.new_price) {
            return None;
        }

        let old_price = product.current_price;
        let difference = reading.new_price - old_price;

        Some(Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            url: product.url.clone(),
            old_price,
            new_price: reading.new_price,
            difference,
            percentage_change: percentage_change(old_price, difference),
            is_on_offer: reading.is_on_offer,
            original_price: reading.original_price,
        })
    }

    pub fn is_increase(&self) -> bool {
        self.difference.is_sign_positive() && !self.difference.is_zero()
    }
}

fn percentage_change(old_price: Decimal, difference: Decimal) -> Option<String> {
    // Zero or vanishingly small old prices have no representable percentage.
    let percent = difference
        .checked_div(old_price)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Some(format!("{:.2}", percent))
}
