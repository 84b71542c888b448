//! Error types for signwall operations

use thiserror::Error;

/// Key-value and relational store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store operation {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
}

impl StoreError {
    pub fn backend(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Serialization errors for stored blobs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode {what}: {reason}")]
    Encode { what: String, reason: String },

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },
}

/// Failures talking to external services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The service rejected our credentials (401). For the identity provider
    /// this means the access token was revoked.
    #[error("{service} rejected the credentials")]
    Unauthorized { service: String },

    #[error("{service} returned status {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Request to {service} failed: {reason}")]
    Transport { service: String, reason: String },

    #[error("Request to {service} timed out")]
    Timeout { service: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

impl UpstreamError {
    pub fn service(&self) -> &str {
        match self {
            Self::Unauthorized { service }
            | Self::Status { service, .. }
            | Self::Transport { service, .. }
            | Self::Timeout { service }
            | Self::InvalidResponse { service, .. } => service,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all signwall errors.
#[derive(Debug, Clone, Error)]
pub enum SignwallError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for signwall operations.
pub type SignwallResult<T> = Result<T, SignwallError>;

// =============================================================================
// TESTS
// =============================================================================
