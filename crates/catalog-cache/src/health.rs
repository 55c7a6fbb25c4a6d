//! Per-tier health readout.
//!
//! [`Coordinator::is_healthy`](crate::Coordinator::is_healthy) answers "can
//! this cache serve traffic", which is true whenever L1 works. That hides a
//! dead Redis from anyone alerting on it, so [`HealthReport`] carries the
//! status of each tier and a `degraded` flag alongside the boolean.

use serde::Serialize;
use time::OffsetDateTime;

use crate::coordinator::CacheMode;
use crate::tier::TierKind;

/// Liveness of a single tier at the moment it was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TierStatus {
    Up,
    Down { reason: String },
    /// Not configured for this deployment.
    Disabled,
}

impl TierStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

/// Result of probing one tier.
#[derive(Debug, Clone, Serialize)]
pub struct TierHealth {
    pub tier: TierKind,
    #[serde(flatten)]
    pub status: TierStatus,
    /// Probe round trip, when a probe was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

impl TierHealth {
    pub(crate) fn new(tier: TierKind, status: TierStatus, latency_ms: Option<u64>) -> Self {
        Self {
            tier,
            status,
            latency_ms,
            checked_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Health of the whole cache, computed fresh on every call.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Same answer as `is_healthy()`: usable, not necessarily at full capacity.
    pub healthy: bool,
    /// A remote tier was asked for but is not serving.
    pub degraded: bool,
    pub mode: CacheMode,
    pub local: TierHealth,
    pub remote: TierHealth,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}
