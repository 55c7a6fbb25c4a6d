//! Remote (L2) tier backed by Redis through a deadpool connection pool.
//!
//! Values are opaque bytes; encoding is the coordinator's concern. Every
//! command is bounded by the configured timeout so a hung server can only
//! slow down the operation that touched it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;

use crate::config::RedisSettings;
use crate::error::{TierError, TierResult};
use crate::tier::{CacheTier, TierKind};

/// Keys fetched per `SCAN` round trip during prefix sweeps.
const SCAN_BATCH: usize = 500;

/// Redis-backed L2 tier.
#[derive(Clone)]
pub struct RemoteTier {
    pool: Pool,
    timeout: Duration,
}

impl RemoteTier {
    /// Build the pool and verify the server answers `PING`.
    ///
    /// ## Errors
    ///
    /// Returns `TierError::Unavailable` when no URL is configured, the URL is
    /// invalid, or the server cannot be reached within the timeout.
    pub async fn connect(settings: &RedisSettings) -> TierResult<Self> {
        let url = settings
            .url()
            .ok_or_else(|| TierError::unavailable(TierKind::Remote, "no Redis URL configured"))?;

        let timeout = settings.timeout();
        let mut pool_config = PoolConfig::new(settings.pool_size.max(1));
        pool_config.timeouts = Timeouts {
            wait: Some(timeout),
            create: Some(timeout),
            recycle: Some(timeout),
        };

        let mut redis_config = Config::from_url(url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| TierError::unavailable(TierKind::Remote, e.to_string()))?;

        let tier = Self { pool, timeout };
        tier.ping().await?;
        Ok(tier)
    }

    /// The underlying pool (shared with the invalidation bus).
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Close the pool; later operations fail as unavailable.
    pub fn close(&self) {
        self.pool.close();
    }

    async fn conn(&self) -> TierResult<Connection> {
        Ok(self.pool.get().await?)
    }

    async fn bounded<T, F>(&self, fut: F) -> TierResult<T>
    where
        F: Future<Output = TierResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TierError::Timeout {
                tier: TierKind::Remote,
                after: self.timeout,
            }),
        }
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally.
pub(crate) fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 4);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheTier for RemoteTier {
    type Value = Vec<u8>;

    fn kind(&self) -> TierKind {
        TierKind::Remote
    }

    async fn get(&self, key: &str) -> TierResult<Option<Vec<u8>>> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let data: Option<Vec<u8>> = conn.get(key).await?;
            Ok::<_, TierError>(data)
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> TierResult<()> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.bounded(async {
            let mut conn = self.conn().await?;
            let _: () = conn.pset_ex(key, value, ttl_ms).await?;
            Ok::<_, TierError>(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> TierResult<()> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let _: () = conn.del(key).await?;
            Ok::<_, TierError>(())
        })
        .await
    }

    /// `SCAN`-then-`DEL` sweep. O(matching keys); administrative use only.
    async fn remove_by_prefix(&self, prefix: &str) -> TierResult<u64> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.bounded(self.conn()).await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(async {
                    Ok::<_, TierError>(redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await?)
                })
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = self
                    .bounded(async { Ok::<_, TierError>(conn.del(&keys).await?) })
                    .await?;
                removed += deleted;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        tracing::info!(prefix = %prefix, removed, "Removed remote cache keys by prefix");
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> TierResult<bool> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let found: bool = conn.exists(key).await?;
            Ok::<_, TierError>(found)
        })
        .await
    }

    async fn ping(&self) -> TierResult<()> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, TierError>(())
        })
        .await
    }
}
