//! Error types for rustgsprofile.
//!
//! Every library function returns `Result<T, ScholarError>`. Transient
//! failures (network, CAPTCHA, rate limiting) are recovered locally by the
//! extraction retry loop and the access-method fallback; only validation
//! failures and an exhausted fallback chain reach the binary as fatal errors.

use thiserror::Error;

/// Main error type for rustgsprofile operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// Scripted browser could not be launched or driven
    #[error("Browser error: {0}")]
    Browser(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by Google Scholar
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Non-success HTTP status
    #[error("HTTP error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Status text or response summary
        message: String,
    },

    /// CAPTCHA or "unusual traffic" page served instead of content
    #[error("CAPTCHA detected, try another access method or refresh cookies")]
    Captcha,

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML writer error
    #[error("XML error: {0}")]
    Xml(String),

    /// Configuration file could not be parsed
    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A run finished without a single extracted publication
    #[error("No publications retrieved: {0}")]
    NoRecords(String),

    /// Every access method in the fallback chain failed
    #[error("All access methods failed (attempted: {attempted}); last error: {last_error}")]
    AccessExhausted {
        /// Comma-separated names of the methods that were actually attempted
        attempted: String,
        /// Message of the last underlying error
        last_error: String,
    },
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ScholarError::Parse(msg.to_string()))
    }
}
