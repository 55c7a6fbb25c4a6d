//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::codec::RemoteCodec;
use crate::error::CacheError;
use crate::tier::MAX_TTL;

/// Which tiers the coordinator should try to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheProvider {
    /// L1 only; Redis is never contacted.
    #[default]
    MemoryOnly,
    /// L1 in front of Redis.
    RemoteEnabled,
    /// L1 in front of Redis (same behaviour as `remote-enabled`).
    Hybrid,
}

impl CacheProvider {
    /// Whether this provider asks for an L2 tier.
    pub fn wants_remote(&self) -> bool {
        matches!(self, Self::RemoteEnabled | Self::Hybrid)
    }
}

/// Cache configuration consumed at coordinator construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Provider selector
    #[serde(default)]
    pub provider: CacheProvider,

    /// L1 tunables
    #[serde(default)]
    pub local: LocalCacheConfig,

    /// L2 connection and tunables
    #[serde(default)]
    pub redis: RedisSettings,

    /// Serialization used for every L2 value
    #[serde(default)]
    pub codec: RemoteCodec,
}

impl CacheConfig {
    /// Checks the settings that can fail startup.
    ///
    /// Connection settings are not validated here: a bad or missing Redis URL
    /// degrades to memory-only mode instead of failing. TTLs of either tier
    /// must not exceed [`MAX_TTL`].
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.local.max_entries == 0 {
            return Err(CacheError::Configuration(
                "cache.local.max_entries must be > 0".into(),
            ));
        }
        if self.local.default_ttl_secs == 0 {
            return Err(CacheError::Configuration(
                "cache.local.default_ttl_secs must be > 0".into(),
            ));
        }
        if self.local.sliding_window_secs == 0 || self.local.max_sliding_window_secs == 0 {
            return Err(CacheError::Configuration(
                "cache.local sliding windows must be > 0".into(),
            ));
        }

        let max = MAX_TTL.as_secs();
        for (name, secs) in [
            ("cache.local.default_ttl_secs", self.local.default_ttl_secs),
            ("cache.local.sliding_window_secs", self.local.sliding_window_secs),
            ("cache.local.max_sliding_window_secs", self.local.max_sliding_window_secs),
            ("cache.redis.default_ttl_secs", self.redis.default_ttl_secs),
        ] {
            if secs > max {
                return Err(CacheError::Configuration(format!(
                    "{name} must be <= {max}"
                )));
            }
        }
        Ok(())
    }
}

/// Local (L1) cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCacheConfig {
    /// Maximum number of entries before eviction kicks in
    #[serde(default = "default_local_max_entries")]
    pub max_entries: u64,

    /// Absolute TTL for entries set without an explicit TTL and for promotions
    #[serde(default = "default_local_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Idle window applied to promoted entries
    #[serde(default = "default_sliding_window_secs")]
    pub sliding_window_secs: u64,

    /// Upper bound for the idle window derived from an explicit TTL
    #[serde(default = "default_max_sliding_window_secs")]
    pub max_sliding_window_secs: u64,
}

impl LocalCacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sliding_window(&self) -> Duration {
        Duration::from_secs(self.sliding_window_secs)
    }

    pub fn max_sliding_window(&self) -> Duration {
        Duration::from_secs(self.max_sliding_window_secs)
    }
}

fn default_local_max_entries() -> u64 {
    1024
}

fn default_local_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_sliding_window_secs() -> u64 {
    120
}

fn default_max_sliding_window_secs() -> u64 {
    300
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_local_max_entries(),
            default_ttl_secs: default_local_ttl_secs(),
            sliding_window_secs: default_sliding_window_secs(),
            max_sliding_window_secs: default_max_sliding_window_secs(),
        }
    }
}

/// Redis (L2) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL (e.g., "redis://localhost:6379").
    /// Missing means memory-only, whatever the provider says.
    #[serde(default)]
    pub url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Pool and per-command timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// TTL for entries set without an explicit TTL
    #[serde(default = "default_redis_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Publish removals so other instances drop the key from their L1
    #[serde(default)]
    pub broadcast_invalidations: bool,

    /// Pub/sub channel used for invalidation broadcasts
    #[serde(default = "default_invalidation_channel")]
    pub invalidation_channel: String,
}

impl RedisSettings {
    /// The URL, if one is configured and non-blank.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_redis_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_invalidation_channel() -> String {
    "cache:invalidate".to_string()
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            default_ttl_secs: default_redis_ttl_secs(),
            broadcast_invalidations: false,
            invalidation_channel: default_invalidation_channel(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.provider, CacheProvider::MemoryOnly);
        assert_eq!(cfg.local.max_entries, 1024);
        assert_eq!(cfg.local.default_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.local.sliding_window(), Duration::from_secs(120));
        assert_eq!(cfg.redis.default_ttl(), Duration::from_secs(1800));
        assert_eq!(cfg.redis.invalidation_channel, "cache:invalidate");
        assert_eq!(cfg.codec, RemoteCodec::Json);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_provider_names() {
        let cfg: CacheConfig =
            serde_json::from_str(r#"{"provider": "hybrid", "redis": {"url": "redis://cache:6379"}}"#)
                .unwrap();
        assert_eq!(cfg.provider, CacheProvider::Hybrid);
        assert!(cfg.provider.wants_remote());
        assert_eq!(cfg.redis.url(), Some("redis://cache:6379"));

        let cfg: CacheConfig = serde_json::from_str(r#"{"provider": "memory-only"}"#).unwrap();
        assert!(!cfg.provider.wants_remote());

        let cfg: CacheConfig = serde_json::from_str(r#"{"provider": "remote-enabled"}"#).unwrap();
        assert!(cfg.provider.wants_remote());
    }

    #[test]
    fn test_blank_url_is_missing() {
        let settings = RedisSettings {
            url: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.url(), None);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut cfg = CacheConfig::default();
        cfg.local.max_entries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_ttls() {
        let mut cfg = CacheConfig::default();
        cfg.local.default_ttl_secs = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = CacheConfig::default();
        cfg.local.sliding_window_secs = MAX_TTL.as_secs() + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = CacheConfig::default();
        cfg.redis.default_ttl_secs = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = CacheConfig::default();
        cfg.local.default_ttl_secs = MAX_TTL.as_secs();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_ignores_remote_settings() {
        let mut cfg = CacheConfig::default();
        cfg.provider = CacheProvider::Hybrid;
        cfg.redis.url = Some("not a url".to_string());
        cfg.redis.pool_size = 0;
        assert!(cfg.validate().is_ok());
    }
}
