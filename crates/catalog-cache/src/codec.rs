//! Serialization for L2 values.
//!
//! One codec is chosen per coordinator and used for every value it writes to
//! or reads from Redis.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{TierError, TierResult};

/// Wire format of values stored in the remote tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteCodec {
    /// JSON text, readable with `redis-cli` and by non-Rust consumers.
    #[default]
    Json,
    /// MessagePack, smaller and faster to decode.
    #[serde(alias = "msgpack")]
    MessagePack,
}

impl RemoteCodec {
    pub fn encode<T: Serialize>(&self, value: &T) -> TierResult<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| TierError::codec(e.to_string())),
            Self::MessagePack => {
                rmp_serde::to_vec_named(value).map_err(|e| TierError::codec(e.to_string()))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> TierResult<T> {
        match self {
            Self::Json => serde_json::from_slice(bytes).map_err(|e| TierError::codec(e.to_string())),
            Self::MessagePack => {
                rmp_serde::from_slice(bytes).map_err(|e| TierError::codec(e.to_string()))
            }
        }
    }
}
