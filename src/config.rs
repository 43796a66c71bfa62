use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
    pub catalog: CatalogConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub navigation_timeout_secs: u64,
    /// How long to wait for a price node to render after navigation.
    pub settle_timeout_ms: u64,
    pub currency_code: String,
    pub selectors: PriceSelectors,
    pub window_width: u32,
    pub window_height: u32,
}

/// CSS selectors for the competitor storefront's product page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceSelectors {
    pub offer_indicator: String,
    pub offer_price: String,
    pub original_price: String,
    pub regular_price: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub inter_product_delay_ms: u64,
    pub session_retention_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub smtp: SmtpConfig,
    pub webhook_url: Option<String>,
    pub app_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub to_address: Option<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            chrome_path: None,
            navigation_timeout_secs: 30,
            settle_timeout_ms: 5_000,
            currency_code: "KES".to_string(),
            selectors: PriceSelectors::default(),
            window_width: 1280,
            window_height: 800,
        }
    }
}

impl Default for PriceSelectors {
    fn default() -> Self {
        Self {
            offer_indicator: ".css-1oh8fze".to_string(),
            offer_price: ".css-1i90gmp".to_string(),
            original_price: ".css-1bdwabt".to_string(),
            regular_price: ".css-17ctnp".to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            inter_product_delay_ms: 500,
            session_retention_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: "0 0 */6 * * *".to_string(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 15,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from_address: None,
            from_name: "Price Sentinel".to_string(),
            to_address: None,
            use_tls: true,
        }
    }
}

impl SmtpConfig {
    /// Email goes out only once credentials and a sender are known.
    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some() && self.sender().is_some()
    }

    pub fn sender(&self) -> Option<&str> {
        self.from_address.as_deref().or(self.username.as_deref())
    }

    pub fn recipient(&self) -> Option<&str> {
        self.to_address.as_deref().or(self.sender())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "price_sentinel=info".to_string(),
            directory: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl ScraperConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

impl MonitorConfig {
    pub fn inter_product_delay(&self) -> Duration {
        Duration::from_millis(self.inter_product_delay_ms)
    }

    pub fn session_retention(&self) -> Duration {
        Duration::from_secs(self.session_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("PRICE_SENTINEL").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    /// Fills unset values from the plain environment variables older
    /// deployments used.
    fn apply_legacy_env(&mut self) {
        if self.scraper.chrome_path.is_none() {
            self.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        let smtp = &mut self.notifications.smtp;
        if smtp.username.is_none() {
            smtp.username = env::var("EMAIL_USER").ok();
        }
        if smtp.password.is_none() {
            smtp.password = env::var("EMAIL_PASSWORD").ok();
        }
        if smtp.to_address.is_none() {
            smtp.to_address = env::var("NOTIFICATION_EMAIL").ok();
        }
        if self.notifications.app_url.is_none() {
            self.notifications.app_url = env::var("APP_URL").ok();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if Url::parse(&self.server.base_url).is_err() {
            return Err(ConfigError::Message("Invalid base URL format".into()));
        }

        if self.scraper.navigation_timeout_secs == 0 {
            return Err(ConfigError::Message("Scraper navigation_timeout_secs must be greater than 0".into()));
        }

        if self.scraper.currency_code.trim().is_empty() {
            return Err(ConfigError::Message("Scraper currency_code cannot be empty".into()));
        }

        let selectors = &self.scraper.selectors;
        if [
            &selectors.offer_indicator,
            &selectors.offer_price,
            &selectors.original_price,
            &selectors.regular_price,
        ]
        .iter()
        .any(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Message("Scraper selectors cannot be empty".into()));
        }

        if self.monitor.session_retention_secs == 0 {
            return Err(ConfigError::Message("Monitor session_retention_secs must be greater than 0".into()));
        }

        if self.scheduler.enabled && !Self::is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.cron".into()));
        }

        if let Some(base_url) = &self.catalog.base_url {
            if Url::parse(base_url).is_err() {
                return Err(ConfigError::Message("Invalid catalog base_url".into()));
            }
        }

        if let Some(webhook_url) = &self.notifications.webhook_url {
            if Url::parse(webhook_url).is_err() {
                return Err(ConfigError::Message("Invalid notifications webhook_url".into()));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }

    /// Basic six-field cron check (sec min hour day month weekday).
    pub fn is_valid_cron(cron_expr: &str) -> bool {
        let parts: Vec<&str> = cron_expr.split_whitespace().collect();
        if parts.len() != 6 {
            return false;
        }

        parts.iter().all(|part| {
            part.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?'))
        })
    }
}
