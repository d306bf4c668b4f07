// src/error.rs

//! Unified error handling for the notifier.

use std::fmt;

use thiserror::Error;

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Listing could not be fetched after the retry budget ran out
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Listing page did not have the expected structure
    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    /// Persisted state is unreachable or corrupt
    #[error("Storage error ({context}): {message}")]
    Storage { context: String, message: String },

    /// Message delivery failed
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// A shutdown signal interrupted the operation
    #[error("Shutdown requested")]
    Shutdown,
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error for a URL.
    pub fn parse(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a storage error with context.
    pub fn storage(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Storage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error must stop the scheduler.
    ///
    /// Only storage failures qualify: without durable dedup state every
    /// further cycle would re-announce the whole catalog.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

/// Failure to deliver one message to one recipient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient blocked the bot or the chat no longer exists.
    #[error("recipient revoked the channel: {reason}")]
    Revoked { reason: String },

    /// Any other failure (rate limit, network, malformed message).
    #[error("{reason}")]
    Other { reason: String },
}

impl DeliveryError {
    pub fn revoked(reason: impl Into<String>) -> Self {
        Self::Revoked {
            reason: reason.into(),
        }
    }

    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_fatal() {
        assert!(AppError::storage("sections/x.json", "disk full").is_fatal());
        assert!(!AppError::fetch("https://example.com", "HTTP 503").is_fatal());
        assert!(!AppError::parse("https://example.com", "no releases").is_fatal());
        assert!(!AppError::from(DeliveryError::other("timeout")).is_fatal());
    }

    #[test]
    fn delivery_error_classification() {
        assert!(DeliveryError::revoked("bot was blocked by the user").is_revoked());
        assert!(!DeliveryError::other("Too Many Requests").is_revoked());
    }
}
