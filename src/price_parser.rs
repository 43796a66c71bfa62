use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::utils::error::{AppError, Result};

/// Reads amounts written as `<CURRENCY_CODE> <amount>`, e.g. `KES 1,299.00`.
#[derive(Debug, Clone)]
pub struct PriceParser {
    currency_code: String,
    price_regex: Regex,
}

impl PriceParser {
    pub fn new(currency_code: &str) -> Result<Self> {
        let code = currency_code.trim();
        if code.is_empty() {
            return Err(AppError::Validation("Currency code cannot be empty".to_string()));
        }

        let pattern = format!(r"{}\s+([\d,.]+)", regex::escape(code));
        let price_regex = Regex::new(&pattern)
            .map_err(|e| AppError::Internal(format!("Invalid price pattern '{}': {}", pattern, e)))?;

        Ok(Self {
            currency_code: code.to_string(),
            price_regex,
        })
    }

    pub fn currency_code(&self) -> &str {
        &self.currency_code
    }

    /// First amount following the currency code, thousands separators
    /// removed. `None` when the text holds no such amount.
    pub fn parse(&self, text: &str) -> Option<Decimal> {
        let captures = self.price_regex.captures(text)?;
        let raw = captures.get(1)?.as_str();
        let amount = raw.replace(',', "");
        // "KES 120.00." at the end of a sentence
        let amount = amount.trim_end_matches('.');
        if amount.is_empty() {
            return None;
        }
        Decimal::from_str(amount).ok()
    }
}
