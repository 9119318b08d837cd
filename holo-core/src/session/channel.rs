//! Custom data-channel messages exchanged with the peer.
//!
//! Payloads are bincode-encoded [`ChannelMessage`] values. The controller
//! answers `Ping` with `Pong` and logs everything else.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::HoloError;

/// Maximum encoded message size accepted on a data channel (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Identifies a custom data channel within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u8);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// The channel opened automatically once a session connects.
pub const STATUS_CHANNEL: ChannelId = ChannelId(64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMessage {
    Ping { seq: u32 },
    Pong { seq: u32 },
    Text(String),
}

impl ChannelMessage {
    pub fn encode(&self) -> Result<Bytes, HoloError> {
        let bytes = bincode::serialize(self)?;
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(HoloError::Encoding(format!(
                "message of {} bytes exceeds {MAX_MESSAGE_SIZE}",
                bytes.len()
            )));
        }
        Ok(Bytes::from(bytes))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, HoloError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(HoloError::Encoding(format!(
                "payload of {} bytes exceeds {MAX_MESSAGE_SIZE}",
                payload.len()
            )));
        }
        Ok(bincode::deserialize(payload)?)
    }
}
