use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::config::CatalogConfig;
use crate::models::{MonitoredProduct, PriceHistoryEntry};
use crate::utils::error::{AppError, Result};

/// Price fields written back for a product whose price moved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub id: String,
    pub current_price: Decimal,
    pub price_history: Vec<PriceHistoryEntry>,
    pub last_checked: DateTime<Utc>,
    pub is_on_offer: bool,
    pub original_price: Option<Decimal>,
}

impl PriceUpdate {
    /// `None` unless the product carries a fresh reading.
    pub fn from_product(product: &MonitoredProduct, at: DateTime<Utc>) -> Option<Self> {
        let new_price = product.new_price?;
        Some(Self {
            id: product.id.clone(),
            current_price: new_price,
            price_history: product.history_with(new_price, at),
            last_checked: product.last_checked.unwrap_or(at),
            is_on_offer: product.is_on_offer,
            original_price: product.original_price,
        })
    }
}

/// The external product store.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn list_products(&self) -> Result<Vec<MonitoredProduct>>;

    async fn update_product(&self, update: &PriceUpdate) -> Result<()>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Wrapped { products: Vec<MonitoredProduct> },
    Bare(Vec<MonitoredProduct>),
}

/// Accepts either `{"products": [...]}` or a bare array.
pub fn parse_listing(body: &str) -> Result<Vec<MonitoredProduct>> {
    let listing: Listing = serde_json::from_str(body)
        .map_err(|e| AppError::Catalog(format!("Unexpected catalog response format: {}", e)))?;

    Ok(match listing {
        Listing::Wrapped { products } | Listing::Bare(products) => products,
    })
}

/// Fills in what older catalog records lack: an id derived from the
/// competitor and position, and a one-point history at the current price.
pub fn normalize_products(products: Vec<MonitoredProduct>, now: DateTime<Utc>) -> Vec<MonitoredProduct> {
    products
        .into_iter()
        .enumerate()
        .map(|(index, mut product)| {
            if product.id.is_empty() {
                product.id = format!("{}-{}", product.competitor_name, index);
            }
            if product.price_history.is_empty() {
                product.price_history.push(PriceHistoryEntry {
                    price: product.current_price,
                    timestamp: now,
                });
            }
            product
        })
        .collect()
}

/// Catalog reached over HTTP at `{base_url}/products`.
pub struct HttpCatalog {
    client: Client,
    products_url: String,
    config: CatalogConfig,
}

impl HttpCatalog {
    pub fn new(base_url: &str, config: CatalogConfig) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| AppError::Validation(format!("Invalid catalog URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            products_url: format!("{}/products", base_url.trim_end_matches('/')),
            config,
        })
    }

    /// `None` when no catalog URL is configured.
    pub fn from_config(config: &CatalogConfig) -> Result<Option<Self>> {
        match &config.base_url {
            Some(base_url) => Ok(Some(Self::new(base_url, config.clone())?)),
            None => Ok(None),
        }
    }

    async fn fetch_products(&self) -> Result<Vec<MonitoredProduct>> {
        let response = self.client.get(&self.products_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Catalog(format!("Catalog responded with status {}", status)));
        }

        let body = response.text().await?;
        parse_listing(&body)
    }
}

#[async_trait]
impl ProductCatalog for HttpCatalog {
    async fn list_products(&self) -> Result<Vec<MonitoredProduct>> {
        let strategy = FixedInterval::from_millis(self.config.retry_delay_ms)
            .take(self.config.retry_attempts.saturating_sub(1) as usize);

        let products = Retry::spawn(strategy, || async {
            self.fetch_products().await.map_err(|e| {
                tracing::warn!(error = %e, "Catalog read failed");
                e
            })
        })
        .await?;

        tracing::debug!(count = products.len(), "Loaded products from catalog");
        Ok(normalize_products(products, Utc::now()))
    }

    async fn update_product(&self, update: &PriceUpdate) -> Result<()> {
        let response = self.client.put(&self.products_url).json(update).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Catalog(format!(
                "Update of product {} failed with status {}",
                update.id, status
            )));
        }

        Ok(())
    }
}
