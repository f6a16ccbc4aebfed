//! Error types for CostWatch

use thiserror::Error;

/// Result type alias using CostWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for CostWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, raised while resolving settings at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed user input (CLI flags, inline JSON)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Billing API error
    #[error("Billing API error: {0}")]
    Billing(String),

    /// Messaging API error
    #[error("Notification error: {0}")]
    Notification(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a billing error
    pub fn billing(msg: impl Into<String>) -> Self {
        Self::Billing(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Whether this error can only come out of settings resolution and
    /// should stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation(_))
    }
}
