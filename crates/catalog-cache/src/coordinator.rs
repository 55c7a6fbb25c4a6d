//! Cache-aside coordinator over the local and remote tiers.
//!
//! ## Lookup
//!
//! ```text
//! get(key) → L1 hit?  → return typed value
//!          → L2 hit?  → decode → promote into L1 → return
//!          → miss
//! ```
//!
//! ## Writes and invalidation
//!
//! `set` writes L1 first, then L2. `remove` removes from both. Neither waits
//! for the other tier to succeed and neither reports failure: every tier error
//! is logged, counted, and turned into a miss or a no-op.
//!
//! ## Consistency
//!
//! Each instance has its own L1, so another instance may serve a stale value
//! until its L1 entry expires (at most the L1 TTL). Enabling
//! `broadcast_invalidations` narrows that window to pub/sub latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::codec::RemoteCodec;
use crate::config::{CacheConfig, LocalCacheConfig};
use crate::error::{CacheError, FailureKind, TierError, TierResult};
use crate::health::{HealthReport, TierHealth, TierStatus};
use crate::invalidation::InvalidationBus;
use crate::local::{ExpiryPolicy, LocalTier, LocalValue};
use crate::metrics;
use crate::remote::RemoteTier;
use crate::tier::{CacheTier, MAX_TTL, SharedRemote, TierKind};

/// Which tiers the coordinator is running with, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    LocalOnly,
    Hybrid,
}

/// Tunables the coordinator applies on top of the tiers.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub local: LocalCacheConfig,
    /// L2 TTL when `set` is called without one.
    pub remote_default_ttl: Duration,
    pub codec: RemoteCodec,
}

impl CoordinatorOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            local: config.local.clone(),
            remote_default_ttl: config.redis.default_ttl(),
            codec: config.codec,
        }
    }
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub mode: CacheMode,
    pub local_entries: u64,
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub promotions: u64,
    pub remote_errors: u64,
}

impl CacheStats {
    /// Share of lookups answered by either tier.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.remote_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Outcome of [`Coordinator::remove_by_prefix`].
///
/// Prefix removal is best effort. L1 cannot enumerate its keys, so a sweep
/// never reaches L1 and keys already there stay until they expire or are
/// removed individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixInvalidation {
    pub prefix: String,
    pub tiers_swept: u8,
    pub tiers_total: u8,
    pub keys_removed: u64,
    /// L1 was left untouched because it cannot sweep by prefix.
    pub local_skipped: bool,
}

impl PrefixInvalidation {
    /// Every active tier was swept.
    pub fn is_complete(&self) -> bool {
        self.tiers_swept == self.tiers_total
    }
}

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    remote_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Two-tier cache-aside coordinator.
///
/// Safe to share across tasks (`Arc<Coordinator>`); all methods take `&self`.
pub struct Coordinator {
    local: LocalTier,
    remote: Option<SharedRemote>,
    /// Whether the configuration asked for L2, even if it never came up.
    remote_requested: bool,
    /// Concrete Redis handle, kept so `close` can shut the pool.
    redis: Option<RemoteTier>,
    bus: Option<InvalidationBus>,
    options: CoordinatorOptions,
    counters: Counters,
}

impl Coordinator {
    /// Build a coordinator from configuration, connecting to Redis when asked.
    ///
    /// A missing URL or an unreachable server is logged and the coordinator
    /// runs with L1 only for its whole lifetime.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Configuration` only for unusable local settings.
    pub async fn connect(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;

        let local = LocalTier::from_config(&config.local);
        let options = CoordinatorOptions::from_config(&config);

        if !config.provider.wants_remote() {
            tracing::info!(
                max_entries = config.local.max_entries,
                "Remote cache disabled, using local cache only"
            );
            return Ok(Self::assemble(local, None, None, None, false, options));
        }

        let Some(url) = config.redis.url() else {
            tracing::warn!(
                provider = ?config.provider,
                "Remote cache requested but no Redis URL configured. Falling back to local cache."
            );
            return Ok(Self::assemble(local, None, None, None, true, options));
        };

        tracing::info!(url = %url, "Connecting to Redis");
        match RemoteTier::connect(&config.redis).await {
            Ok(redis) => {
                let bus = config.redis.broadcast_invalidations.then(|| {
                    InvalidationBus::start(
                        redis.pool().clone(),
                        url,
                        &config.redis.invalidation_channel,
                        config.redis.timeout(),
                        local.clone(),
                    )
                });
                tracing::info!(
                    broadcast = bus.is_some(),
                    "Connected to Redis, hybrid cache enabled (L1 + L2)"
                );
                let shared: SharedRemote = Arc::new(redis.clone());
                Ok(Self::assemble(
                    local,
                    Some(shared),
                    Some(redis),
                    bus,
                    true,
                    options,
                ))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to connect to Redis. Falling back to local cache."
                );
                Ok(Self::assemble(local, None, None, None, true, options))
            }
        }
    }

    /// Assemble a coordinator from ready-made tiers.
    pub fn new(local: LocalTier, remote: Option<SharedRemote>, options: CoordinatorOptions) -> Self {
        let requested = remote.is_some();
        Self::assemble(local, remote, None, None, requested, options)
    }

    fn assemble(
        local: LocalTier,
        remote: Option<SharedRemote>,
        redis: Option<RemoteTier>,
        bus: Option<InvalidationBus>,
        remote_requested: bool,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            local,
            remote,
            remote_requested,
            redis,
            bus,
            options,
            counters: Counters::default(),
        }
    }

    pub fn mode(&self) -> CacheMode {
        if self.remote.is_some() {
            CacheMode::Hybrid
        } else {
            CacheMode::LocalOnly
        }
    }

    /// The L1 tier.
    pub fn local(&self) -> &LocalTier {
        &self.local
    }

    /// Bind a cancellation token to a batch of operations.
    pub fn cancellable<'a>(&'a self, token: &'a CancellationToken) -> Cancellable<'a> {
        Cancellable {
            coordinator: self,
            token,
        }
    }

    /// Look up `key`, returning `None` on a miss or on any failure.
    pub async fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.get_inner(key, None).await
    }

    /// Write `value` to L1 and L2. `ttl` defaults per tier when `None`.
    pub async fn set<T>(&self, key: &str, value: T, ttl: Option<Duration>)
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.set_inner(key, value, ttl, None).await;
    }

    /// Remove `key` from both tiers.
    pub async fn remove(&self, key: &str) {
        self.remove_inner(key, None).await;
    }

    /// Remove every key starting with `prefix` from the tiers that support it.
    pub async fn remove_by_prefix(&self, prefix: &str) -> PrefixInvalidation {
        self.remove_by_prefix_inner(prefix, None).await
    }

    /// Whether `key` is present in either tier.
    pub async fn exists(&self, key: &str) -> bool {
        self.exists_inner(key, None).await
    }

    /// Whether the cache can serve traffic.
    ///
    /// L1 is always available, so this is `true` even when L2 is down. The
    /// L2 probe still runs and a failure is logged; use [`health`](Self::health)
    /// to see per-tier status.
    pub async fn is_healthy(&self) -> bool {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.ping().await {
                self.record_remote_error("ping", &e);
            }
        }
        true
    }

    /// Probe every tier now and report their status.
    pub async fn health(&self) -> HealthReport {
        let local = match self.local.ping().await {
            Ok(()) => TierHealth::new(TierKind::Local, TierStatus::Up, Some(0)),
            Err(e) => TierHealth::new(
                TierKind::Local,
                TierStatus::Down {
                    reason: e.to_string(),
                },
                None,
            ),
        };

        let remote = match &self.remote {
            Some(remote) => {
                let started = Instant::now();
                let result = remote.ping().await;
                let latency = Some(started.elapsed().as_millis() as u64);
                match result {
                    Ok(()) => TierHealth::new(TierKind::Remote, TierStatus::Up, latency),
                    Err(e) => {
                        self.record_remote_error("ping", &e);
                        TierHealth::new(
                            TierKind::Remote,
                            TierStatus::Down {
                                reason: e.to_string(),
                            },
                            latency,
                        )
                    }
                }
            }
            None if self.remote_requested => TierHealth::new(
                TierKind::Remote,
                TierStatus::Down {
                    reason: "not connected at startup".to_string(),
                },
                None,
            ),
            None => TierHealth::new(TierKind::Remote, TierStatus::Disabled, None),
        };

        HealthReport {
            healthy: local.status.is_up(),
            degraded: self.remote_requested && !remote.status.is_up(),
            mode: self.mode(),
            local,
            remote,
            checked_at: time::OffsetDateTime::now_utc(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let local_entries = self.local.entry_count();
        metrics::set_cache_entries(TierKind::Local.as_str(), local_entries);

        CacheStats {
            mode: self.mode(),
            local_entries,
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            remote_hits: self.counters.remote_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            promotions: self.counters.promotions.load(Ordering::Relaxed),
            remote_errors: self.counters.remote_errors.load(Ordering::Relaxed),
        }
    }

    /// Drop every L1 entry on this instance. L2 is untouched.
    pub fn clear_local(&self) {
        self.local.clear();
    }

    /// Stop the invalidation listener and release the Redis pool.
    ///
    /// Later operations keep working against L1; L2 calls fail and degrade.
    pub fn close(&self) {
        if let Some(bus) = &self.bus {
            bus.shutdown();
        }
        if let Some(redis) = &self.redis {
            redis.close();
            tracing::info!("Closed Redis connection pool");
        }
    }

    async fn get_inner<T>(&self, key: &str, cancel: Option<&CancellationToken>) -> Option<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if is_cancelled(cancel) {
            return None;
        }

        if let Some(value) = self.local.lookup(key).await {
            match value.downcast::<T>() {
                Ok(typed) => {
                    Counters::bump(&self.counters.local_hits);
                    metrics::record_cache_hit(TierKind::Local.as_str());
                    tracing::debug!(key = %key, "cache hit (L1)");
                    return Some(typed);
                }
                Err(_) => {
                    tracing::warn!(
                        key = %key,
                        expected = std::any::type_name::<T>(),
                        "L1 entry has a different type, treating as miss"
                    );
                }
            }
        }

        let Some(remote) = &self.remote else {
            return self.miss(key);
        };

        let bytes = match guarded(cancel, remote.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return self.miss(key),
            Err(e) => {
                self.record_remote_error("get", &e);
                return self.miss(key);
            }
        };

        let value: T = match self.options.codec.decode(&bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Failed to decode cached value, removing it"
                );
                self.record_remote_error("decode", &e);
                if let Err(e) = guarded(cancel, remote.remove(key)).await {
                    self.record_remote_error("remove", &e);
                }
                return self.miss(key);
            }
        };

        if is_cancelled(cancel) {
            return None;
        }

        let typed = Arc::new(value);
        let erased: LocalValue = typed.clone();
        self.local
            .insert(key, erased, ExpiryPolicy::promotion(&self.options.local))
            .await;

        Counters::bump(&self.counters.remote_hits);
        Counters::bump(&self.counters.promotions);
        metrics::record_cache_hit(TierKind::Remote.as_str());
        metrics::record_promotion();
        tracing::debug!(key = %key, "cache hit (L2), promoted to L1");
        Some(typed)
    }

    async fn set_inner<T>(
        &self,
        key: &str,
        value: T,
        ttl: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) where
        T: Serialize + Send + Sync + 'static,
    {
        if is_cancelled(cancel) {
            return;
        }

        let encoded = self.remote.as_ref().map(|_| self.options.codec.encode(&value));

        let local_ttl = ttl
            .unwrap_or_else(|| self.options.local.default_ttl())
            .min(MAX_TTL);
        let erased: LocalValue = Arc::new(value);
        if let Err(e) = self.local.set(key, erased, local_ttl).await {
            tracing::warn!(key = %key, error = %e, "Failed to write L1 cache");
        }

        let (Some(remote), Some(encoded)) = (&self.remote, encoded) else {
            return;
        };
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode value for L2");
                self.record_remote_error("encode", &e);
                return;
            }
        };

        let remote_ttl = ttl.unwrap_or(self.options.remote_default_ttl).min(MAX_TTL);
        if let Err(e) = guarded(cancel, remote.set(key, bytes, remote_ttl)).await {
            self.record_remote_error("set", &e);
        }
    }

    async fn remove_inner(&self, key: &str, cancel: Option<&CancellationToken>) {
        if is_cancelled(cancel) {
            return;
        }

        self.local.evict(key).await;

        if let Some(remote) = &self.remote {
            if let Err(e) = guarded(cancel, remote.remove(key)).await {
                self.record_remote_error("remove", &e);
            }
        }

        if let Some(bus) = &self.bus {
            if let Err(e) = guarded(cancel, bus.publish(key)).await {
                self.record_remote_error("publish", &e);
            }
        }

        tracing::debug!(key = %key, "cache entry removed");
    }

    async fn remove_by_prefix_inner(
        &self,
        prefix: &str,
        cancel: Option<&CancellationToken>,
    ) -> PrefixInvalidation {
        let mut outcome = PrefixInvalidation {
            prefix: prefix.to_string(),
            tiers_swept: 0,
            tiers_total: if self.remote.is_some() { 2 } else { 1 },
            keys_removed: 0,
            local_skipped: false,
        };

        if is_cancelled(cancel) {
            return outcome;
        }

        match CacheTier::remove_by_prefix(&self.local, prefix).await {
            Ok(removed) => {
                outcome.tiers_swept += 1;
                outcome.keys_removed += removed;
            }
            Err(e) if e.is_unsupported() => {
                outcome.local_skipped = true;
                tracing::warn!(
                    prefix = %prefix,
                    "Prefix removal cannot reach the local cache; \
                     L1 entries under this prefix remain until they expire"
                );
            }
            Err(e) => tracing::warn!(prefix = %prefix, error = %e, "L1 prefix removal failed"),
        }

        if let Some(remote) = &self.remote {
            match guarded(cancel, remote.remove_by_prefix(prefix)).await {
                Ok(removed) => {
                    outcome.tiers_swept += 1;
                    outcome.keys_removed += removed;
                }
                Err(e) => self.record_remote_error("remove_by_prefix", &e),
            }
        }

        tracing::info!(
            prefix = %prefix,
            swept = outcome.tiers_swept,
            total = outcome.tiers_total,
            removed = outcome.keys_removed,
            "Prefix invalidation finished"
        );
        outcome
    }

    async fn exists_inner(&self, key: &str, cancel: Option<&CancellationToken>) -> bool {
        if is_cancelled(cancel) {
            return false;
        }
        if self.local.contains(key) {
            return true;
        }
        let Some(remote) = &self.remote else {
            return false;
        };
        match guarded(cancel, remote.exists(key)).await {
            Ok(found) => found,
            Err(e) => {
                self.record_remote_error("exists", &e);
                false
            }
        }
    }

    fn miss<T>(&self, key: &str) -> Option<T> {
        Counters::bump(&self.counters.misses);
        metrics::record_cache_miss();
        tracing::debug!(key = %key, "cache miss");
        None
    }

    fn record_remote_error(&self, op: &'static str, err: &TierError) {
        match err.kind() {
            FailureKind::Cancelled => {
                tracing::debug!(op, "remote cache operation cancelled");
            }
            kind => {
                Counters::bump(&self.counters.remote_errors);
                metrics::record_tier_error(TierKind::Remote.as_str(), op);
                tracing::warn!(op, kind = %kind, error = %err, "Remote cache operation failed");
            }
        }
    }
}

/// Coordinator operations that stop waiting when a token is cancelled.
///
/// A cancelled lookup is a miss; a cancelled write or removal may have
/// reached L1 but not L2, which looks the same as an L2 failure.
pub struct Cancellable<'a> {
    coordinator: &'a Coordinator,
    token: &'a CancellationToken,
}

impl Cancellable<'_> {
    pub async fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.coordinator.get_inner(key, Some(self.token)).await
    }

    pub async fn set<T>(&self, key: &str, value: T, ttl: Option<Duration>)
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.coordinator
            .set_inner(key, value, ttl, Some(self.token))
            .await;
    }

    pub async fn remove(&self, key: &str) {
        self.coordinator.remove_inner(key, Some(self.token)).await;
    }

    pub async fn remove_by_prefix(&self, prefix: &str) -> PrefixInvalidation {
        self.coordinator
            .remove_by_prefix_inner(prefix, Some(self.token))
            .await
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.coordinator.exists_inner(key, Some(self.token)).await
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

async fn guarded<T, F>(cancel: Option<&CancellationToken>, fut: F) -> TierResult<T>
where
    F: Future<Output = TierResult<T>>,
{
    match cancel {
        None => fut.await,
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(TierError::Cancelled),
            result = fut => result,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRemoteTier;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: i64,
        name: String,
        price: u64,
    }

    fn item(id: i64, price: u64) -> Item {
        Item {
            id,
            name: format!("item-{id}"),
            price,
        }
    }

    fn hybrid() -> (Coordinator, Arc<MemoryRemoteTier>) {
        let remote = Arc::new(MemoryRemoteTier::new());
        let options = CoordinatorOptions::default();
        let local = LocalTier::from_config(&options.local);
        let shared: SharedRemote = remote.clone();
        (Coordinator::new(local, Some(shared), options), remote)
    }

    fn local_only() -> Coordinator {
        let options = CoordinatorOptions::default();
        Coordinator::new(LocalTier::from_config(&options.local), None, options)
    }

    #[tokio::test]
    async fn test_set_then_get_served_from_l1() {
        let (cache, remote) = hybrid();
        cache.set("product:1", item(1, 15000), None).await;

        let hit = cache.get::<Item>("product:1").await.unwrap();
        assert_eq!(*hit, item(1, 15000));
        assert_eq!(remote.calls().get, 0);
        assert_eq!(remote.calls().set, 1);
        assert!(remote.raw("product:1").is_some());
    }

    #[tokio::test]
    async fn test_remove_then_get_misses() {
        let (cache, remote) = hybrid();
        cache.set("product:1", item(1, 15000), None).await;
        cache.remove("product:1").await;

        assert!(cache.get::<Item>("product:1").await.is_none());
        assert!(remote.raw("product:1").is_none());
        assert!(!cache.exists("product:1").await);
    }

    #[tokio::test]
    async fn test_remote_hit_promotes_into_l1() {
        let (cache, remote) = hybrid();
        let bytes = RemoteCodec::Json.encode(&item(7, 999)).unwrap();
        remote.put_raw("product:7", bytes, Duration::from_secs(60));

        let first = cache.get::<Item>("product:7").await.unwrap();
        assert_eq!(first.price, 999);
        assert_eq!(remote.calls().get, 1);

        let second = cache.get::<Item>("product:7").await.unwrap();
        assert_eq!(*second, *first);
        assert_eq!(remote.calls().get, 1);

        let stats = cache.stats();
        assert_eq!(stats.remote_hits, 1);
        assert_eq!(stats.local_hits, 1);
        assert_eq!(stats.promotions, 1);
    }

    #[tokio::test]
    async fn test_miss_in_both_tiers() {
        let (cache, remote) = hybrid();
        assert!(cache.get::<Item>("product:404").await.is_none());
        assert_eq!(remote.calls().get, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_default_ttls_per_tier() {
        let (cache, remote) = hybrid();
        cache.set("a", item(1, 1), None).await;
        assert_eq!(remote.last_ttl(), Some(Duration::from_secs(1800)));

        cache
            .set("b", item(2, 2), Some(Duration::from_secs(600)))
            .await;
        assert_eq!(remote.last_ttl(), Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_set_with_huge_ttl_does_not_panic() {
        let (cache, remote) = hybrid();
        cache
            .set("product:1", item(1, 42), Some(Duration::MAX))
            .await;

        assert_eq!(cache.get::<Item>("product:1").await.unwrap().price, 42);
        assert_eq!(remote.last_ttl(), Some(MAX_TTL));
        assert!(remote.raw("product:1").is_some());
    }

    #[tokio::test]
    async fn test_promotion_with_huge_default_ttl_does_not_panic() {
        let remote = Arc::new(MemoryRemoteTier::new());
        let mut options = CoordinatorOptions::default();
        options.local.default_ttl_secs = u64::MAX;
        options.local.sliding_window_secs = u64::MAX;
        let local = LocalTier::from_config(&options.local);
        let shared: SharedRemote = remote.clone();
        let cache = Coordinator::new(local, Some(shared), options);

        let bytes = RemoteCodec::Json.encode(&item(3, 7)).unwrap();
        remote.put_raw("product:3", bytes, Duration::MAX);

        assert_eq!(cache.get::<Item>("product:3").await.unwrap().price, 7);
        assert_eq!(cache.stats().promotions, 1);
        cache.get::<Item>("product:3").await.unwrap();
        assert_eq!(cache.stats().local_hits, 1);
    }

    #[tokio::test]
    async fn test_clear_local_falls_back_to_l2() {
        let (cache, remote) = hybrid();
        cache.set("product:1", item(1, 15000), None).await;
        cache.clear_local();

        assert!(cache.local().lookup("product:1").await.is_none());
        let hit = cache.get::<Item>("product:1").await.unwrap();
        assert_eq!(hit.price, 15000);
        assert_eq!(remote.calls().get, 1);
        assert_eq!(cache.stats().remote_hits, 1);
    }

    #[tokio::test]
    async fn test_exists_answers_from_l1_first() {
        let (cache, remote) = hybrid();
        cache.set("product:1", item(1, 1), None).await;

        assert!(cache.exists("product:1").await);
        assert_eq!(remote.calls().exists, 0);
        // A check is not a read
        assert_eq!(cache.stats().local_hits, 0);
    }

    #[tokio::test]
    async fn test_remote_failures_degrade_silently() {
        let (cache, remote) = hybrid();
        remote.set_failing(true);

        cache.set("product:1", item(1, 100), None).await;
        let hit = cache.get::<Item>("product:1").await.unwrap();
        assert_eq!(hit.price, 100);

        assert!(cache.get::<Item>("product:2").await.is_none());
        assert!(cache.exists("product:1").await);
        assert!(!cache.exists("product:2").await);

        cache.remove("product:1").await;
        assert!(cache.get::<Item>("product:1").await.is_none());

        let outcome = cache.remove_by_prefix("product:").await;
        assert_eq!(outcome.tiers_swept, 0);

        assert!(cache.is_healthy().await);
        let report = cache.health().await;
        assert!(report.healthy);
        assert!(report.degraded);
        assert!(matches!(report.remote.status, TierStatus::Down { .. }));
        assert!(cache.stats().remote_errors > 0);
    }

    #[tokio::test]
    async fn test_undecodable_remote_value_is_removed() {
        let (cache, remote) = hybrid();
        remote.put_raw("product:1", b"{not json".to_vec(), Duration::from_secs(60));

        assert!(cache.get::<Item>("product:1").await.is_none());
        assert!(remote.raw("product:1").is_none());
        assert_eq!(remote.calls().remove, 1);
    }

    #[tokio::test]
    async fn test_l1_type_mismatch_falls_through_to_l2() {
        let (cache, remote) = hybrid();
        cache.set("product:1", "a string".to_string(), None).await;
        let bytes = RemoteCodec::Json.encode(&item(1, 5)).unwrap();
        remote.put_raw("product:1", bytes, Duration::from_secs(60));

        let hit = cache.get::<Item>("product:1").await.unwrap();
        assert_eq!(hit.price, 5);
        assert_eq!(remote.calls().get, 1);
    }

    #[tokio::test]
    async fn test_prefix_removal_reports_partial_success() {
        let (cache, remote) = hybrid();
        cache.set("product:1", item(1, 1), None).await;
        cache.set("product:all", vec![item(1, 1)], None).await;
        cache.set("category:1", item(9, 9), None).await;

        let outcome = cache.remove_by_prefix("product:").await;
        assert_eq!(outcome.tiers_swept, 1);
        assert_eq!(outcome.tiers_total, 2);
        assert_eq!(outcome.keys_removed, 2);
        assert!(outcome.local_skipped);
        assert!(!outcome.is_complete());

        assert!(remote.raw("product:1").is_none());
        assert!(remote.raw("category:1").is_some());
        // L1 still holds the swept keys until they expire.
        assert!(cache.get::<Item>("product:1").await.is_some());
    }

    #[tokio::test]
    async fn test_prefix_removal_local_only() {
        let cache = local_only();
        let outcome = cache.remove_by_prefix("product:").await;
        assert_eq!(outcome.tiers_swept, 0);
        assert_eq!(outcome.tiers_total, 1);
        assert!(outcome.local_skipped);
    }

    #[tokio::test]
    async fn test_local_only_mode() {
        let cache = local_only();
        assert_eq!(cache.mode(), CacheMode::LocalOnly);

        cache.set("k", item(1, 1), None).await;
        assert!(cache.exists("k").await);
        assert!(cache.is_healthy().await);

        let report = cache.health().await;
        assert!(!report.degraded);
        assert_eq!(report.remote.status, TierStatus::Disabled);
    }

    #[tokio::test]
    async fn test_connect_memory_only() {
        let cache = Coordinator::connect(CacheConfig::default()).await.unwrap();
        assert_eq!(cache.mode(), CacheMode::LocalOnly);
        assert!(!cache.health().await.degraded);
    }

    #[tokio::test]
    async fn test_connect_falls_back_when_redis_unreachable() {
        let mut config = CacheConfig::default();
        config.provider = crate::CacheProvider::Hybrid;
        config.redis.url = Some("redis://127.0.0.1:1".to_string());
        config.redis.timeout_ms = 500;

        let cache = Coordinator::connect(config).await.unwrap();
        assert_eq!(cache.mode(), CacheMode::LocalOnly);

        cache.set("product:1", item(1, 1), None).await;
        assert!(cache.get::<Item>("product:1").await.is_some());
        assert!(cache.is_healthy().await);

        let report = cache.health().await;
        assert!(report.healthy);
        assert!(report.degraded);
        cache.close();
    }

    #[tokio::test]
    async fn test_connect_without_url_falls_back() {
        let mut config = CacheConfig::default();
        config.provider = crate::CacheProvider::RemoteEnabled;

        let cache = Coordinator::connect(config).await.unwrap();
        assert_eq!(cache.mode(), CacheMode::LocalOnly);
        assert!(cache.health().await.degraded);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_local_settings() {
        let mut config = CacheConfig::default();
        config.local.max_entries = 0;
        assert!(Coordinator::connect(config).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_lookup_is_a_miss_without_promotion() {
        let (cache, remote) = hybrid();
        let bytes = RemoteCodec::Json.encode(&item(1, 1)).unwrap();
        remote.put_raw("product:1", bytes, Duration::from_secs(60));
        remote.set_latency(Duration::from_millis(500));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = cache.cancellable(&token).get::<Item>("product:1").await;
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(cache.local().lookup("product:1").await.is_none());
        assert_eq!(cache.stats().remote_errors, 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_skips_tiers() {
        let (cache, remote) = hybrid();
        let token = CancellationToken::new();
        token.cancel();

        let scoped = cache.cancellable(&token);
        scoped.set("k", item(1, 1), None).await;
        assert!(scoped.get::<Item>("k").await.is_none());
        assert!(!scoped.exists("k").await);
        assert_eq!(remote.calls().set, 0);
        assert_eq!(remote.calls().get, 0);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let (cache, _remote) = hybrid();
        cache.set("k", item(1, 1), None).await;
        cache.get::<Item>("k").await;
        cache.get::<Item>("k").await;
        cache.get::<Item>("missing").await;

        let stats = cache.stats();
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let (cache, _remote) = hybrid();
        let cache = Arc::new(cache);

        let mut handles = Vec::new();
        for i in 0..16i64 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("product:{}", i % 4);
                cache.set(&key, item(i, i as u64), None).await;
                let _ = cache.get::<Item>(&key).await;
                cache.remove(&key).await;
                let _ = cache.exists(&key).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
