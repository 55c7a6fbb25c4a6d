//! Local (L1) tier backed by moka.
//!
//! Entries hold typed values (`Arc<dyn Any + Send + Sync>`) so repeated hits
//! skip deserialization entirely. Each entry carries two deadlines:
//!
//! - an absolute deadline (`inserted_at + ttl`) that is never extended
//! - a sliding idle window, renewed on every read
//!
//! Whichever comes first evicts the entry. The cache is bounded by entry
//! count; under pressure moka's TinyLFU policy evicts the least valuable
//! entries first.
//!
//! ## Limitation
//!
//! Keys cannot be enumerated by prefix, so [`CacheTier::remove_by_prefix`]
//! returns [`TierError::Unsupported`]. Callers that need a namespace gone from
//! L1 must remove the keys they know about (e.g. `product:all`) explicitly.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use crate::config::LocalCacheConfig;
use crate::error::{TierError, TierResult};
use crate::tier::{CacheTier, MAX_TTL, TierKind};

/// A typed value as stored in L1.
pub type LocalValue = Arc<dyn Any + Send + Sync>;

/// Lifetime of an L1 entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Absolute lifetime from insertion.
    pub ttl: Duration,
    /// Idle window, renewed on each read, capped by the absolute deadline.
    pub sliding: Duration,
}

impl ExpiryPolicy {
    /// Policy for an explicit `set` with `ttl`: the idle window is half the
    /// TTL, capped at `max_sliding`. `ttl` is clamped to [`MAX_TTL`].
    pub fn for_ttl(ttl: Duration, max_sliding: Duration) -> Self {
        let ttl = ttl.min(MAX_TTL);
        Self {
            ttl,
            sliding: (ttl / 2).min(max_sliding),
        }
    }

    /// Policy for values promoted from L2.
    pub fn promotion(config: &LocalCacheConfig) -> Self {
        Self {
            ttl: config.default_ttl().min(MAX_TTL),
            sliding: config.sliding_window().min(MAX_TTL),
        }
    }
}

#[derive(Clone)]
struct LocalEntry {
    value: LocalValue,
    expires_at: Instant,
    sliding: Duration,
}

impl LocalEntry {
    fn new(value: LocalValue, policy: ExpiryPolicy) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(policy.ttl.min(MAX_TTL))
            .unwrap_or(now);
        Self {
            value,
            expires_at,
            sliding: policy.sliding.min(MAX_TTL),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Per-entry expiry: `min(sliding, time left before the absolute deadline)`.
struct SlidingExpiry;

impl Expiry<String, LocalEntry> for SlidingExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LocalEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.sliding.min(value.remaining(created_at)))
    }

    fn expire_after_read(
        &self,
        _key: &String,
        value: &LocalEntry,
        read_at: Instant,
        _duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        Some(value.sliding.min(value.remaining(read_at)))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &LocalEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.sliding.min(value.remaining(updated_at)))
    }
}

/// In-process, size-bounded L1 cache.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Clone)]
pub struct LocalTier {
    cache: Cache<String, LocalEntry>,
    max_sliding: Duration,
}

impl LocalTier {
    /// Create an L1 tier holding at most `max_entries` entries.
    pub fn new(max_entries: u64, max_sliding: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(SlidingExpiry)
                .build(),
            max_sliding,
        }
    }

    pub fn from_config(config: &LocalCacheConfig) -> Self {
        Self::new(config.max_entries, config.max_sliding_window())
    }

    /// Insert with an explicit expiry policy.
    pub async fn insert(&self, key: &str, value: LocalValue, policy: ExpiryPolicy) {
        self.cache
            .insert(key.to_string(), LocalEntry::new(value, policy))
            .await;
    }

    /// Look up a live entry.
    pub async fn lookup(&self, key: &str) -> Option<LocalValue> {
        let entry = self.cache.get(key).await?;
        if entry.is_expired(Instant::now()) {
            self.cache.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    /// Whether a live entry exists, without renewing its idle window.
    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Drop a single entry.
    pub async fn evict(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        tracing::info!("Cleared local cache tier");
    }

    /// Approximate number of entries (exact after [`run_pending_tasks`](Self::run_pending_tasks)).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Flush pending maintenance work (evictions, expirations).
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    type Value = LocalValue;

    fn kind(&self) -> TierKind {
        TierKind::Local
    }

    async fn get(&self, key: &str) -> TierResult<Option<LocalValue>> {
        Ok(self.lookup(key).await)
    }

    async fn set(&self, key: &str, value: LocalValue, ttl: Duration) -> TierResult<()> {
        self.insert(key, value, ExpiryPolicy::for_ttl(ttl, self.max_sliding))
            .await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> TierResult<()> {
        self.evict(key).await;
        Ok(())
    }

    async fn remove_by_prefix(&self, _prefix: &str) -> TierResult<u64> {
        Err(TierError::unsupported(TierKind::Local, "remove_by_prefix"))
    }

    async fn exists(&self, key: &str) -> TierResult<bool> {
        Ok(self.contains(key))
    }

    async fn ping(&self) -> TierResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> LocalValue {
        Arc::new(s.to_string())
    }

    fn as_string(v: LocalValue) -> String {
        v.downcast::<String>().map(|s| (*s).clone()).unwrap()
    }

    #[test]
    fn test_policy_for_ttl() {
        let cap = Duration::from_secs(300);
        let policy = ExpiryPolicy::for_ttl(Duration::from_secs(600), cap);
        assert_eq!(policy.sliding, Duration::from_secs(300));

        let policy = ExpiryPolicy::for_ttl(Duration::from_secs(60), cap);
        assert_eq!(policy.sliding, Duration::from_secs(30));
    }

    #[test]
    fn test_policy_promotion() {
        let policy = ExpiryPolicy::promotion(&LocalCacheConfig::default());
        assert_eq!(policy.ttl, Duration::from_secs(300));
        assert_eq!(policy.sliding, Duration::from_secs(120));
    }

    #[test]
    fn test_policy_clamps_huge_ttl() {
        let policy = ExpiryPolicy::for_ttl(Duration::MAX, Duration::from_secs(300));
        assert_eq!(policy.ttl, MAX_TTL);
        assert_eq!(policy.sliding, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_set_with_huge_ttl_does_not_panic() {
        let tier = LocalTier::new(100, Duration::MAX);
        tier.set("product:1", value("Laptop"), Duration::MAX)
            .await
            .unwrap();
        tier.insert(
            "product:2",
            value("Mouse"),
            ExpiryPolicy {
                ttl: Duration::MAX,
                sliding: Duration::MAX,
            },
        )
        .await;

        assert_eq!(as_string(tier.get("product:1").await.unwrap().unwrap()), "Laptop");
        assert_eq!(as_string(tier.get("product:2").await.unwrap().unwrap()), "Mouse");
    }

    #[tokio::test]
    async fn test_contains_does_not_renew_idle_window() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.insert(
            "k",
            value("v"),
            ExpiryPolicy {
                ttl: Duration::from_secs(10),
                sliding: Duration::from_millis(300),
            },
        )
        .await;

        // Checks inside the idle window must not keep the entry alive
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tier.exists("k").await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!tier.exists("k").await.unwrap());
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.set("product:1", value("Laptop"), Duration::from_secs(60))
            .await
            .unwrap();

        let hit = tier.get("product:1").await.unwrap().unwrap();
        assert_eq!(as_string(hit), "Laptop");
        assert!(tier.exists("product:1").await.unwrap());
        assert!(tier.get("product:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.set("k", value("old"), Duration::from_secs(60)).await.unwrap();
        tier.set("k", value("new"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(as_string(tier.get("k").await.unwrap().unwrap()), "new");
    }

    #[tokio::test]
    async fn test_remove() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.set("k", value("v"), Duration::from_secs(60)).await.unwrap();
        tier.remove("k").await.unwrap();
        assert!(tier.get("k").await.unwrap().is_none());

        // Removing a missing key is fine
        tier.remove("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_absolute_expiration() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.insert(
            "k",
            value("v"),
            ExpiryPolicy {
                ttl: Duration::from_millis(100),
                sliding: Duration::from_secs(10),
            },
        )
        .await;
        assert!(tier.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sliding_expiration_on_idle() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.insert(
            "k",
            value("v"),
            ExpiryPolicy {
                ttl: Duration::from_secs(10),
                sliding: Duration::from_millis(100),
            },
        )
        .await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sliding_never_extends_past_ttl() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.insert(
            "k",
            value("v"),
            ExpiryPolicy {
                ttl: Duration::from_millis(600),
                sliding: Duration::from_millis(400),
            },
        )
        .await;

        // Reads inside the idle window keep the entry alive...
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(tier.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(tier.get("k").await.unwrap().is_some());

        // ...but not past the absolute deadline
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let tier = LocalTier::new(10, Duration::from_secs(300));
        for i in 0..50 {
            tier.set(&format!("k{i}"), value("v"), Duration::from_secs(60))
                .await
                .unwrap();
        }
        tier.run_pending_tasks().await;
        assert!(tier.entry_count() <= 10);
    }

    #[tokio::test]
    async fn test_prefix_removal_is_unsupported() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        tier.set("product:1", value("v"), Duration::from_secs(60))
            .await
            .unwrap();

        let err = tier.remove_by_prefix("product:").await.unwrap_err();
        assert!(err.is_unsupported());
        // Nothing was removed behind the caller's back
        assert!(tier.get("product:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        for i in 0..5 {
            tier.set(&format!("k{i}"), value("v"), Duration::from_secs(60))
                .await
                .unwrap();
        }
        tier.clear();
        for i in 0..5 {
            assert!(tier.get(&format!("k{i}")).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let tier = LocalTier::new(100, Duration::from_secs(300));
        let other = tier.clone();
        tier.set("k", value("v"), Duration::from_secs(60)).await.unwrap();
        other.evict("k").await;
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let tier = LocalTier::new(1000, Duration::from_secs(300));
        let mut handles = Vec::new();
        for t in 0..8 {
            let tier = tier.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    let key = format!("k{}", i % 10);
                    tier.set(&key, value(&format!("{t}-{i}")), Duration::from_secs(60))
                        .await
                        .unwrap();
                    if let Some(v) = tier.get(&key).await.unwrap() {
                        // Never a torn value: always a whole String
                        assert!(v.downcast::<String>().is_ok());
                    }
                    if i % 7 == 0 {
                        tier.remove(&key).await.unwrap();
                    }
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}
