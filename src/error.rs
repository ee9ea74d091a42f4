//! Error Handling Infrastructure
//!
//! This module defines the error type returned by every fallible operation in the crate.
//! Errors raised by the underlying PostgreSQL client, the AWS SDK and rustls are wrapped
//! transparently: their `Display` output and `source()` chain are those of the native error.
//!
//! # Error Categories
//! - `Usage`: Connection-string invocation where only parameter maps are supported
//! - `InvalidParameter`: A connection parameter that cannot be interpreted (e.g. `port`)
//! - `Token`: The authentication backend failed to mint a token
//! - `Postgres`: Any error raised by `postgres` / `tokio-postgres`
//! - `Tls`: rustls rejected the TLS configuration
//! - `Io`: Filesystem errors (CA bundle, configuration files)
//! - `Config`: Malformed URLs, profiles or certificate bundles
//! - `MissingDependency`: A driver whose cargo feature is not enabled

use thiserror::Error;

/// Boxed error produced by the AWS SDK.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for pg-rdsiam operations
#[derive(Error, Debug)]
pub enum RdsIamError {
    /// Unsupported invocation, never retried
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// Connection parameter with an unusable value
    #[error("Invalid connection parameter: {0}")]
    InvalidParameter(String),

    /// Authentication token could not be generated
    #[error(transparent)]
    Token(BoxError),

    /// Error from the PostgreSQL client (shared by `postgres` and `tokio-postgres`)
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    /// TLS configuration rejected by rustls
    #[error(transparent)]
    Tls(#[from] rustls::Error),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration error (invalid URL, profile file, certificate bundle, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Driver requested without the cargo feature that provides it
    #[error("Missing dependency: {0}")]
    MissingDependency(String),
}

impl RdsIamError {
    /// Convert error to a stable error code string
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Usage(_) => "USAGE_ERROR",
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::Token(_) => "TOKEN_FAILED",
            Self::Postgres(_) => "POSTGRES_ERROR",
            Self::Tls(_) => "TLS_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::MissingDependency(_) => "MISSING_DEPENDENCY",
        }
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Borrow the native PostgreSQL client error, if this is one
    #[must_use]
    pub fn as_postgres(&self) -> Option<&tokio_postgres::Error> {
        match self {
            Self::Postgres(e) => Some(e),
            _ => None,
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Wrap an authentication backend error
    pub fn token(source: impl Into<BoxError>) -> Self {
        Self::Token(source.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a missing dependency error
    pub fn missing_dependency(message: impl Into<String>) -> Self {
        Self::MissingDependency(message.into())
    }
}

/// Result type alias for pg-rdsiam operations
pub type Result<T> = std::result::Result<T, RdsIamError>;
