//! Error types for the cache tiers and coordinator construction.
//!
//! Tier errors never cross the [`Coordinator`](crate::Coordinator) boundary:
//! they are logged and converted into a miss or a no-op. Only invalid local
//! configuration can fail construction.

use std::fmt;
use std::time::Duration;

use crate::tier::TierKind;

/// Result type for tier operations.
pub type TierResult<T> = Result<T, TierError>;

/// Errors reported by a single cache tier.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// No connection could be obtained (pool exhausted, server down, not connected).
    #[error("{tier} tier unavailable: {message}")]
    Unavailable { tier: TierKind, message: String },

    /// The tier did not answer within its configured timeout.
    #[error("{tier} tier timed out after {}ms", .after.as_millis())]
    Timeout { tier: TierKind, after: Duration },

    /// The tier answered with an error.
    #[error("{tier} tier backend error: {message}")]
    Backend { tier: TierKind, message: String },

    /// A value could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// The tier cannot perform the requested operation at all.
    #[error("{tier} tier does not support {operation}")]
    Unsupported {
        tier: TierKind,
        operation: &'static str,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl TierError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(tier: TierKind, message: impl Into<String>) -> Self {
        Self::Unavailable {
            tier,
            message: message.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(tier: TierKind, message: impl Into<String>) -> Self {
        Self::Backend {
            tier,
            message: message.into(),
        }
    }

    /// Creates a new `Codec` error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a new `Unsupported` error.
    #[must_use]
    pub fn unsupported(tier: TierKind, operation: &'static str) -> Self {
        Self::Unsupported { tier, operation }
    }

    /// Returns `true` if this is a capability gap rather than a runtime failure.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Classifies the error for logging and metrics.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable { .. }
            | Self::Timeout { .. }
            | Self::Backend { .. }
            | Self::Codec { .. } => FailureKind::Transient,
            Self::Unsupported { .. } => FailureKind::CapabilityGap,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

impl From<redis::RedisError> for TierError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                tier: TierKind::Remote,
                after: Duration::ZERO,
            };
        }
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            return Self::unavailable(TierKind::Remote, err.to_string());
        }
        Self::backend(TierKind::Remote, err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for TierError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::unavailable(TierKind::Remote, err.to_string())
    }
}

/// How a tier failure is handled by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network error, timeout or codec error on a single key.
    /// Degrades the operation to a miss or no-op.
    Transient,
    /// A design-known limitation of the tier, reported as partial success.
    CapabilityGap,
    /// The caller gave up; treated like a miss.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::CapabilityGap => write!(f, "capability_gap"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors that can occur while building a [`Coordinator`](crate::Coordinator).
///
/// Remote misconfiguration is not an error: it falls back to memory-only mode.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Local tier settings are unusable.
    #[error("invalid cache configuration: {0}")]
    Configuration(String),
}
