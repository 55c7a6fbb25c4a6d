//! In-process stand-in for the remote tier.
//!
//! Behaves like Redis for the operations the coordinator uses, counts every
//! call, and can be told to fail or to stall so degradation and cancellation
//! paths can be tested without a server.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{TierError, TierResult};
use crate::tier::{CacheTier, MAX_TTL, TierKind};

/// Snapshot of how often each operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub set: usize,
    pub remove: usize,
    pub remove_by_prefix: usize,
    pub exists: usize,
    pub ping: usize,
}

#[derive(Default)]
struct Counters {
    get: AtomicUsize,
    set: AtomicUsize,
    remove: AtomicUsize,
    remove_by_prefix: AtomicUsize,
    exists: AtomicUsize,
    ping: AtomicUsize,
}

/// Remote tier double backed by a `DashMap`.
#[derive(Default)]
pub struct MemoryRemoteTier {
    entries: DashMap<String, (Vec<u8>, Instant)>,
    calls: Counters,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    last_ttl: Mutex<Option<Duration>>,
}

impl MemoryRemoteTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as unavailable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            get: self.calls.get.load(Ordering::SeqCst),
            set: self.calls.set.load(Ordering::SeqCst),
            remove: self.calls.remove.load(Ordering::SeqCst),
            remove_by_prefix: self.calls.remove_by_prefix.load(Ordering::SeqCst),
            exists: self.calls.exists.load(Ordering::SeqCst),
            ping: self.calls.ping.load(Ordering::SeqCst),
        }
    }

    /// Store raw bytes directly, bypassing counters and failure injection.
    pub fn put_raw(&self, key: &str, bytes: impl Into<Vec<u8>>, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now);
        self.entries.insert(key.to_string(), (bytes.into(), expires_at));
    }

    /// Raw bytes of a live entry, bypassing counters and failure injection.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .get(key)
            .filter(|entry| entry.1 > Instant::now())
            .map(|entry| entry.0.clone())
    }

    /// TTL passed to the most recent `set`.
    pub fn last_ttl(&self) -> Option<Duration> {
        self.last_ttl.lock().ok().and_then(|ttl| *ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn enter(&self, counter: &AtomicUsize) -> TierResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TierError::unavailable(TierKind::Remote, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheTier for MemoryRemoteTier {
    type Value = Vec<u8>;

    fn kind(&self) -> TierKind {
        TierKind::Remote
    }

    async fn get(&self, key: &str) -> TierResult<Option<Vec<u8>>> {
        self.enter(&self.calls.get).await?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> TierResult<()> {
        self.enter(&self.calls.set).await?;
        if let Ok(mut last) = self.last_ttl.lock() {
            *last = Some(ttl);
        }
        self.put_raw(key, value, ttl);
        Ok(())
    }

    async fn remove(&self, key: &str) -> TierResult<()> {
        self.enter(&self.calls.remove).await?;
        self.entries.remove(key);
        Ok(())
    }

    async fn remove_by_prefix(&self, prefix: &str) -> TierResult<u64> {
        self.enter(&self.calls.remove_by_prefix).await?;
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - self.entries.len()) as u64)
    }

    async fn exists(&self, key: &str) -> TierResult<bool> {
        self.enter(&self.calls.exists).await?;
        Ok(self.raw(key).is_some())
    }

    async fn ping(&self) -> TierResult<()> {
        self.enter(&self.calls.ping).await
    }
}
