//! Redis Pub/Sub for cross-instance L1 invalidation.
//!
//! L1 is private to each process, so a write on one instance leaves stale
//! copies in every other instance's L1 until their TTLs run out. When
//! `broadcast_invalidations` is on, every key removal is published and each
//! instance drops that key from its own L1.
//!
//! ## Example Flow
//!
//! ```text
//! Instance 1: coordinator.remove("product:1")
//!   ↓
//! Redis Pub/Sub: PUBLISH cache:invalidate "<instance-1-id>|product:1"
//!   ↓
//! Instance 1: ignores its own message
//! Instance 2: listener receives "product:1" → evicts from L1
//! ```

use std::time::Duration;

use deadpool_redis::Pool;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{TierError, TierResult};
use crate::local::LocalTier;
use crate::tier::TierKind;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Publisher plus a background listener for one coordinator.
pub struct InvalidationBus {
    pool: Pool,
    channel: String,
    instance_id: Uuid,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl InvalidationBus {
    /// Spawn the listener and return the publishing half.
    ///
    /// The listener uses a dedicated pub/sub connection opened from
    /// `redis_url`; it reconnects with exponential backoff until
    /// [`shutdown`](Self::shutdown) is called.
    pub fn start(
        pool: Pool,
        redis_url: &str,
        channel: &str,
        timeout: Duration,
        local: LocalTier,
    ) -> Self {
        let bus = Self {
            pool,
            channel: channel.to_string(),
            instance_id: Uuid::new_v4(),
            timeout,
            shutdown: CancellationToken::new(),
        };

        let listener = Listener {
            redis_url: redis_url.to_string(),
            channel: bus.channel.clone(),
            instance_id: bus.instance_id,
            local,
            shutdown: bus.shutdown.clone(),
        };
        tokio::spawn(listener.run_forever());

        bus
    }

    /// Tell the other instances to drop `key` from their L1.
    pub async fn publish(&self, key: &str) -> TierResult<()> {
        let payload = encode_message(self.instance_id, key);
        let publish = async {
            let mut conn = self.pool.get().await?;
            let _: () = conn.publish(&self.channel, payload).await?;
            Ok::<_, TierError>(())
        };

        match tokio::time::timeout(self.timeout, publish).await {
            Ok(result) => {
                if result.is_ok() {
                    tracing::debug!(key = %key, "published cache invalidation");
                }
                result
            }
            Err(_) => Err(TierError::Timeout {
                tier: TierKind::Remote,
                after: self.timeout,
            }),
        }
    }

    /// Stop the listener. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for InvalidationBus {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Listener {
    redis_url: String,
    channel: String,
    instance_id: Uuid,
    local: LocalTier,
    shutdown: CancellationToken,
}

impl Listener {
    async fn run_forever(self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                outcome = self.run() => outcome,
            };

            match outcome {
                Ok(()) => backoff = INITIAL_BACKOFF,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "Cache invalidation listener error, reconnecting..."
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        tracing::info!(channel = %self.channel, "Cache invalidation listener stopped");
    }

    async fn run(&self) -> Result<(), String> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = %self.channel, "Subscribed to cache invalidation channel");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let Ok(payload) = msg.get_payload::<String>() else {
                tracing::warn!("failed to parse invalidation message payload");
                continue;
            };
            match decode_message(&payload) {
                Some((origin, _)) if origin == self.instance_id => {}
                Some((_, key)) => {
                    tracing::debug!(key = %key, "received cache invalidation");
                    self.local.evict(key).await;
                }
                None => tracing::warn!(payload = %payload, "malformed invalidation message"),
            }
        }

        Err("pub/sub connection closed".to_string())
    }
}

fn encode_message(instance_id: Uuid, key: &str) -> String {
    format!("{instance_id}|{key}")
}

fn decode_message(payload: &str) -> Option<(Uuid, &str)> {
    let (origin, key) = payload.split_once('|')?;
    let origin = Uuid::parse_str(origin).ok()?;
    (!key.is_empty()).then_some((origin, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_format() {
        let id = Uuid::new_v4();
        let payload = encode_message(id, "product:1");
        assert_eq!(payload, format!("{id}|product:1"));
        assert_eq!(decode_message(&payload), Some((id, "product:1")));
    }

    #[test]
    fn test_key_may_contain_separator() {
        let id = Uuid::new_v4();
        let payload = encode_message(id, "odd|key");
        assert_eq!(decode_message(&payload), Some((id, "odd|key")));
    }

    #[test]
    fn test_malformed_messages() {
        assert_eq!(decode_message("product:1"), None);
        assert_eq!(decode_message("not-a-uuid|product:1"), None);
        assert_eq!(decode_message(&format!("{}|", Uuid::new_v4())), None);
    }
}
