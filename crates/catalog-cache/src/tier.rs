//! The seam shared by both cache tiers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TierResult;

/// Longest lifetime any tier will accept. Longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Which tier an entry, error or health probe belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Local,
    Remote,
}

impl TierKind {
    /// Short label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cache tier.
///
/// Tiers report failures through [`TierError`](crate::TierError); deciding
/// what a failure means for the caller is the coordinator's job. A tier that
/// fundamentally cannot perform an operation returns
/// [`TierError::Unsupported`](crate::TierError::Unsupported) instead of
/// pretending to succeed.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// What the tier stores: typed objects in-process, bytes over the network.
    type Value: Send + Sync;

    /// Which tier this is.
    fn kind(&self) -> TierKind;

    /// Look up a live entry.
    async fn get(&self, key: &str) -> TierResult<Option<Self::Value>>;

    /// Insert or overwrite an entry that expires after `ttl`.
    async fn set(&self, key: &str, value: Self::Value, ttl: Duration) -> TierResult<()>;

    /// Remove an entry. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> TierResult<()>;

    /// Remove every entry whose key starts with `prefix`, returning how many
    /// were removed.
    async fn remove_by_prefix(&self, prefix: &str) -> TierResult<u64>;

    /// Whether a live entry exists for `key`.
    async fn exists(&self, key: &str) -> TierResult<bool>;

    /// Liveness probe.
    async fn ping(&self) -> TierResult<()>;
}

/// Handle to whichever remote tier the coordinator talks to.
pub type SharedRemote = Arc<dyn CacheTier<Value = Vec<u8>>>;
