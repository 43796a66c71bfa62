// Shared fakes and helpers for the integration tests.

pub mod api_tests;
pub mod monitor_tests;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use price_sentinel::{
    catalog::{PriceUpdate, ProductCatalog},
    config::MonitorConfig,
    models::{BroadcastEvent, ExtractionResult, MonitoredProduct, PriceChangeRecord},
    monitor::{EventSink, PriceMonitor},
    plugins::{ChangeNotifier, NotificationResult},
    scraper::{BrowserSession, EngineLauncher},
    web::{create_router, AppState},
    AppConfig, AppError, Broadcaster, MonitorService, SessionStore,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

type AppResult<T> = Result<T, AppError>;

/// What the fake browser sees at a URL.
#[derive(Debug, Clone)]
pub enum Page {
    Price(ExtractionResult),
    Timeout,
    MissingPrice,
}

#[derive(Default)]
pub struct EngineStats {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub visits: Mutex<Vec<String>>,
}

/// Launcher whose pages are scripted per URL.
pub struct ScriptedLauncher {
    pages: HashMap<String, Page>,
    fail_launch: bool,
    pub stats: Arc<EngineStats>,
}

impl ScriptedLauncher {
    pub fn new(pages: Vec<(String, Page)>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            fail_launch: false,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: HashMap::new(),
            fail_launch: true,
            stats: Arc::new(EngineStats::default()),
        }
    }
}

struct ScriptedSession {
    pages: HashMap<String, Page>,
    stats: Arc<EngineStats>,
    open: bool,
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self) -> AppResult<Box<dyn BrowserSession>> {
        if self.fail_launch {
            return Err(AppError::EngineLaunch("Could not find Chrome binary".to_string()));
        }
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            pages: self.pages.clone(),
            stats: Arc::clone(&self.stats),
            open: true,
        }))
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn extract(&self, url: &str) -> AppResult<ExtractionResult> {
        self.stats.visits.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(Page::Price(reading)) => Ok(reading.clone()),
            Some(Page::Timeout) => Err(AppError::Timeout {
                url: url.to_string(),
                seconds: 30,
            }),
            Some(Page::MissingPrice) | None => Err(AppError::ElementNotFound {
                selector: ".css-17ctnp".to_string(),
            }),
        }
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        if std::mem::take(&mut self.open) {
            self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingSink {
    pub fn progress_counts(&self) -> Vec<usize> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                BroadcastEvent::Progress { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: BroadcastEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<Vec<PriceChangeRecord>>>,
    pub fail: bool,
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, price_changes: &[PriceChangeRecord]) -> AppResult<NotificationResult> {
        self.calls.lock().unwrap().push(price_changes.to_vec());
        if self.fail {
            return Err(AppError::Notification("SMTP connection refused".to_string()));
        }
        Ok(NotificationResult::delivered(None))
    }
}

#[derive(Default)]
pub struct RecordingCatalog {
    pub products: Vec<MonitoredProduct>,
    pub updates: Mutex<Vec<PriceUpdate>>,
    pub reject_ids: Vec<String>,
}

#[async_trait]
impl ProductCatalog for RecordingCatalog {
    async fn list_products(&self) -> AppResult<Vec<MonitoredProduct>> {
        Ok(self.products.clone())
    }

    async fn update_product(&self, update: &PriceUpdate) -> AppResult<()> {
        if self.reject_ids.contains(&update.id) {
            return Err(AppError::Catalog(format!("write rejected for {}", update.id)));
        }
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

pub fn url_for(id: &str) -> String {
    format!("https://shop.example/{}", id)
}

pub fn product(id: &str, current_price: Decimal) -> MonitoredProduct {
    MonitoredProduct {
        id: id.to_string(),
        name: format!("Product {}", id),
        competitor_name: "acme".to_string(),
        url: url_for(id),
        current_price,
        new_price: None,
        is_on_offer: false,
        original_price: None,
        last_checked: None,
        price_history: vec![],
    }
}

pub fn no_delay() -> MonitorConfig {
    MonitorConfig {
        inter_product_delay_ms: 0,
        ..MonitorConfig::default()
    }
}

pub fn service_with(monitor: PriceMonitor) -> MonitorService {
    MonitorService::new(
        Arc::new(monitor),
        SessionStore::new(Duration::from_secs(30 * 60)),
        Broadcaster::new(),
    )
}

pub fn app_with(service: MonitorService) -> Router {
    create_router(AppState {
        service,
        config: Arc::new(AppConfig::default()),
    })
}

pub async fn make_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> anyhow::Result<(axum::http::StatusCode, serde_json::Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }

    let request = request.body(match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    })?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, json))
}
