//! Two-tier cache-aside coordinator for catalog read paths.
//!
//! ## Architecture
//!
//! - **L1 ([`LocalTier`])**: in-process moka cache, typed values, TTL plus
//!   sliding expiration, bounded by entry count
//! - **L2 ([`RemoteTier`])**: Redis, serialized values, TTL only, shared
//!   across instances
//! - **[`Coordinator`]**: lookup order, promotion, dual writes, dual
//!   invalidation, prefix sweeps, health aggregation
//!
//! ## Cache Hierarchy
//!
//! ```text
//! get(key) → L1 (moka) → L2 (Redis) → caller falls through to the store
//!               ↓             ↓
//!            typed hit    decode + promote into L1
//! ```
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable at startup the coordinator runs in L1-only mode.
//! Any L2 failure after startup degrades the single operation to a miss or
//! a no-op. Cache operations never return errors to callers.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod invalidation;
pub mod key;
pub mod local;
pub mod metrics;
pub mod remote;
pub mod tier;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use codec::RemoteCodec;
pub use config::{CacheConfig, CacheProvider, LocalCacheConfig, RedisSettings};
pub use coordinator::{
    CacheMode, CacheStats, Cancellable, Coordinator, CoordinatorOptions, PrefixInvalidation,
};
pub use error::{CacheError, FailureKind, TierError};
pub use health::{HealthReport, TierHealth, TierStatus};
pub use key::KeySpace;
pub use local::LocalTier;
pub use remote::RemoteTier;
pub use tier::{CacheTier, MAX_TTL, SharedRemote, TierKind};
