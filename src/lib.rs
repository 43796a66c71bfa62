pub mod broadcaster;
pub mod catalog;
pub mod config;
pub mod models;
pub mod monitor;
pub mod plugins;
pub mod price_parser;
pub mod scheduler;
pub mod scraper;
pub mod session_relay;
pub mod session_store;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use broadcaster::Broadcaster;
pub use config::AppConfig;
pub use models::{BroadcastEvent, ExtractionResult, MonitoredProduct, PriceChangeRecord, SessionStatus};
pub use monitor::{EventSink, MonitorOutcome, PriceMonitor};
pub use session_relay::MonitorService;
pub use session_store::SessionStore;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
