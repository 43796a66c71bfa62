use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Timed out after {seconds}s loading {url}")]
    Timeout { url: String, seconds: u64 },

    #[error("Browser engine failed to launch: {0}")]
    EngineLaunch(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Parse { message: message.into() }
    }

    /// Failures that only cost the current product; the batch keeps going.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            AppError::Scraping(_)
                | AppError::ElementNotFound { .. }
                | AppError::Parse { .. }
                | AppError::Timeout { .. }
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
