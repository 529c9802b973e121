use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes. Callers match on these rather than on messages.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const ALREADY_RESOLVED: &str = "ALREADY_RESOLVED";
    pub const PROVIDER_UNAVAILABLE: &str = "PROVIDER_UNAVAILABLE";
    pub const PROVIDER_SEND_FAILED: &str = "PROVIDER_SEND_FAILED";
    pub const PARTIAL_DELIVERY_FAILURE: &str = "PARTIAL_DELIVERY_FAILURE";

    pub const DB_OPEN_FAILED: &str = "DB_OPEN_FAILED";
    pub const DB_QUERY_FAILED: &str = "DB_QUERY_FAILED";
    pub const DB_WRITE_FAILED: &str = "DB_WRITE_FAILED";
    pub const DB_TX_FAILED: &str = "DB_TX_FAILED";
    pub const DB_MIGRATION_FAILED: &str = "DB_MIGRATION_FAILED";

    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const TIME_FORMAT_FAILED: &str = "TIME_FORMAT_FAILED";
}

/// Single structured error shape used across the core, the provider crate and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_ARGUMENT, message)
    }

    pub fn already_resolved(message: impl Into<String>) -> Self {
        Self::new(codes::ALREADY_RESOLVED, message)
    }

    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::new(codes::PROVIDER_UNAVAILABLE, message)
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
