use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use scraper::{Html, Selector};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::{PriceSelectors, ScraperConfig};
use crate::models::ExtractionResult;
use crate::price_parser::PriceParser;
use crate::utils::error::{AppError, Result};

/// Starts one browser engine for a monitoring pass.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// A running browser engine, shared by every product of one pass.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Visits `url` in a fresh page and reads its price.
    async fn extract(&self, url: &str) -> Result<ExtractionResult>;

    /// Stops the engine. Calling it again is a no-op.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Compiled form of [`PriceSelectors`].
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    offer_indicator: Selector,
    offer_price: Selector,
    original_price: Selector,
    regular_price: Selector,
    selectors: PriceSelectors,
    parser: PriceParser,
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| AppError::Validation(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

impl PriceExtractor {
    pub fn new(selectors: &PriceSelectors, currency_code: &str) -> Result<Self> {
        Ok(Self {
            offer_indicator: compile(&selectors.offer_indicator)?,
            offer_price: compile(&selectors.offer_price)?,
            original_price: compile(&selectors.original_price)?,
            regular_price: compile(&selectors.regular_price)?,
            selectors: selectors.clone(),
            parser: PriceParser::new(currency_code)?,
        })
    }

    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        Self::new(&config.selectors, &config.currency_code)
    }

    /// CSS group matching any price node, used to wait for render.
    pub fn any_price_selector(&self) -> String {
        format!("{}, {}", self.selectors.offer_price, self.selectors.regular_price)
    }

    /// Applies the extraction policy to a rendered page: an offer badge means
    /// an offer price plus the struck-through original, otherwise the regular
    /// price node. Anything unreadable is a per-product failure.
    pub fn extract_from_html(&self, html: &str) -> Result<ExtractionResult> {
        let document = Html::parse_document(html);

        if document.select(&self.offer_indicator).next().is_some() {
            let offer_text = self
                .first_text(&document, &self.offer_price)
                .ok_or_else(|| AppError::ElementNotFound {
                    selector: self.selectors.offer_price.clone(),
                })?;
            let price = self.parser.parse(&offer_text).ok_or_else(|| {
                AppError::parse(format!(
                    "No {} amount in offer price '{}'",
                    self.parser.currency_code(),
                    offer_text
                ))
            })?;

            let original_price = self
                .first_text(&document, &self.original_price)
                .and_then(|text| self.parser.parse(&text));

            return Ok(ExtractionResult::offer(price, original_price));
        }

        let price_text = self
            .first_text(&document, &self.regular_price)
            .ok_or_else(|| AppError::ElementNotFound {
                selector: self.selectors.regular_price.clone(),
            })?;
        let price = self.parser.parse(&price_text).ok_or_else(|| {
            AppError::parse(format!(
                "No {} amount in price '{}'",
                self.parser.currency_code(),
                price_text
            ))
        })?;

        Ok(ExtractionResult::regular(price))
    }

    fn first_text(&self, document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .next()
            .map(|element| element.text().collect::<Vec<_>>().join(" ").trim().to_string())
    }
}

/// Launches headless Chrome.
pub struct ChromeLauncher {
    config: ScraperConfig,
    extractor: Arc<PriceExtractor>,
}

impl ChromeLauncher {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let extractor = Arc::new(PriceExtractor::from_config(&config)?);
        Ok(Self { config, extractor })
    }

    fn launch_options(&self) -> Result<LaunchOptions<'static>> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some((self.config.window_width, self.config.window_height)))
            .idle_browser_timeout(self.config.navigation_timeout() * 4)
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-setuid-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-accelerated-2d-canvas"),
                OsStr::new("--disable-gpu"),
            ])
            .build()
            .map_err(|e| AppError::EngineLaunch(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &self.config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        Ok(launch_options)
    }
}

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let launch_options = self.launch_options()?;

        let browser = tokio::task::spawn_blocking(move || Browser::new(launch_options))
            .await
            .map_err(|e| AppError::EngineLaunch(format!("Launch task failed: {}", e)))?
            .map_err(|e| AppError::EngineLaunch(format!("Failed to launch browser: {}", e)))?;

        tracing::debug!("Headless browser launched");

        Ok(Box::new(ChromeSession {
            browser: Some(Arc::new(browser)),
            config: self.config.clone(),
            extractor: Arc::clone(&self.extractor),
            stragglers: Mutex::new(Vec::new()),
        }))
    }
}

type PageTask = JoinHandle<Result<String>>;

pub struct ChromeSession {
    browser: Option<Arc<Browser>>,
    config: ScraperConfig,
    extractor: Arc<PriceExtractor>,
    /// Page visits abandoned on timeout; joined before the engine is dropped.
    stragglers: Mutex<Vec<PageTask>>,
}

/// One budget shared by every wait of a page visit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub(crate) fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Time left, or a timeout error once the budget is spent.
    pub(crate) fn remaining(&self, url: &str) -> Result<Duration> {
        let left = self.at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(AppError::Timeout {
                url: url.to_string(),
                seconds: self.budget.as_secs(),
            });
        }
        Ok(left)
    }

    /// `wait` capped to the time left.
    pub(crate) fn cap(&self, url: &str, wait: Duration) -> Result<Duration> {
        Ok(self.remaining(url)?.min(wait))
    }
}

/// Closes its tab when dropped, whichever way the visit ended.
struct TabGuard(Arc<Tab>);

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(true) {
            tracing::debug!(error = %e, "Failed to close tab");
        }
    }
}

fn render_page(
    browser: &Browser,
    url: &str,
    user_agent: &str,
    deadline: Deadline,
    settle_timeout: Duration,
    wait_selector: &str,
) -> Result<String> {
    let tab = TabGuard(
        browser
            .new_tab()
            .map_err(|e| AppError::Scraping(format!("Failed to create tab: {}", e)))?,
    );

    tab.0
        .set_user_agent(user_agent, None, None)
        .map_err(|e| AppError::Scraping(format!("Failed to set user agent: {}", e)))?;

    tab.0.set_default_timeout(deadline.remaining(url)?);
    tab.0
        .navigate_to(url)
        .map_err(|e| AppError::Scraping(format!("Navigation failed: {}", e)))?;
    tab.0.set_default_timeout(deadline.remaining(url)?);
    tab.0
        .wait_until_navigated()
        .map_err(|e| AppError::Scraping(format!("Page load failed: {}", e)))?;

    // Prices are rendered client-side; give them a bounded chance to appear.
    let settle = deadline.cap(url, settle_timeout)?;
    if let Err(e) = tab.0.wait_for_element_with_custom_timeout(wait_selector, settle) {
        tracing::debug!(url, error = %e, "No price node rendered before settle timeout");
    }
    deadline.remaining(url)?;

    tab.0
        .get_content()
        .map_err(|e| AppError::Scraping(format!("Failed to get page content: {}", e)))
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn extract(&self, url: &str) -> Result<ExtractionResult> {
        let browser = self
            .browser
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| AppError::Scraping("Browser session already shut down".to_string()))?;

        let start_time = Instant::now();
        let timeout = self.config.navigation_timeout();
        let settle_timeout = self.config.settle_timeout();
        let user_agent = self.config.user_agent.clone();
        let wait_selector = self.extractor.any_price_selector();
        let target = url.to_string();

        let deadline = Deadline::after(timeout);

        let mut visit = tokio::task::spawn_blocking(move || {
            render_page(&browser, &target, &user_agent, deadline, settle_timeout, &wait_selector)
        });

        let html = match tokio::time::timeout(timeout, &mut visit).await {
            Ok(joined) => joined.map_err(|e| AppError::Scraping(format!("Page task failed: {}", e)))??,
            Err(_) => {
                // The blocking visit stops at its own deadline; keep it for shutdown.
                if let Ok(mut stragglers) = self.stragglers.lock() {
                    stragglers.retain(|task| !task.is_finished());
                    stragglers.push(visit);
                }
                return Err(AppError::Timeout {
                    url: url.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        let result = self.extractor.extract_from_html(&html);
        tracing::debug!(
            url,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Page visited"
        );
        result
    }

    async fn shutdown(&mut self) -> Result<()> {
        let stragglers = match self.stragglers.get_mut() {
            Ok(stragglers) => std::mem::take(stragglers),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for task in stragglers {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "Abandoned page visit failed");
            }
        }

        if let Some(browser) = self.browser.take() {
            // Dropping the last handle kills the Chrome process.
            tokio::task::spawn_blocking(move || drop(browser))
                .await
                .map_err(|e| AppError::Internal(format!("Browser shutdown task failed: {}", e)))?;
            tracing::debug!("Headless browser shut down");
        }
        Ok(())
    }
}
