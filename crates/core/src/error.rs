//! Error taxonomy for calls that cross an external boundary.
//!
//! Every collaborator (broker endpoint, indicator source, scanner, decision
//! engine) reports failures as an [`ExternalError`] so work units can decide
//! between skipping a tick, substituting a value, or waiting out a recovery
//! interval.

use std::time::Duration;

use thiserror::Error;

/// Failure of a call to something outside the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    /// The call did not complete within its timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// Connection, DNS or TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream answered with a non-success status.
    #[error("upstream error: {status} - {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Body or reason returned by the upstream.
        message: String,
    },

    /// The upstream throttled the request.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The response arrived but could not be used (malformed, out of range).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Every configured provider is currently marked unhealthy.
    #[error("no healthy provider available")]
    NoHealthyProvider,

    /// The upstream understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Credentials were refused (HTTP 401/403).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl ExternalError {
    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Creates an upstream status error.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Creates an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Returns true if the condition is expected to clear on its own
    /// (timeouts, transport failures, throttling, 5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this outcome should count as a failed call when
    /// tracking provider health.
    ///
    /// Rejections and most 4xx responses do not count. Refused credentials
    /// do, since every later call to that provider fails the same way.
    #[must_use]
    pub fn counts_against_health(&self) -> bool {
        self.is_transient() || matches!(self, Self::InvalidData(_) | Self::Unauthorized(_))
    }

    /// Returns the suggested delay before the next attempt, if any.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::Timeout { .. } | Self::Transport(_) => Some(1),
            Self::Upstream { status, .. } if *status >= 500 => Some(2),
            _ => None,
        }
    }
}

/// Result alias for external calls.
pub type ExternalResult<T> = std::result::Result<T, ExternalError>;
