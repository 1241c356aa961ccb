use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling server errors.
///
/// `RoomNotFound` and `RoomFull` are reported to the requesting client, and their
/// `Display` output is the exact text placed in the `error` envelope. The rest are
/// only ever logged.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("Room not found")]
    RoomNotFound(String),

    #[error("Room is full")]
    RoomFull(RoomCode),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Whether this error is answered with an `error` envelope.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::RoomNotFound(_) | Self::RoomFull(_))
    }
}

pub const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const ROOM_CODE_LEN: usize = 6;
const CONNECTION_ID_LEN: usize = 13;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

static NEXT_CONNECTION: AtomicU32 = AtomicU32::new(1);

/// Room code: 6 uppercase alphanumerics, stored inline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomCode {
    bytes: [u8; ROOM_CODE_LEN],
}

impl RoomCode {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut bytes = [0u8; ROOM_CODE_LEN];
        for byte in &mut bytes {
            *byte = ROOM_CODE_CHARS[rng.random_range(0..ROOM_CODE_CHARS.len())];
        }
        Self { bytes }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses user input into canonical form. Anything that cannot be a code can never
/// name a live room, so it fails as `RoomNotFound`.
impl FromStr for RoomCode {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let src = s.trim().as_bytes();
        if src.len() != ROOM_CODE_LEN || !src.iter().all(u8::is_ascii_alphanumeric) {
            return Err(SignalingError::RoomNotFound(s.to_string()));
        }

        let mut bytes = [0u8; ROOM_CODE_LEN];
        for (dst, src) in bytes.iter_mut().zip(src) {
            *dst = src.to_ascii_uppercase();
        }
        Ok(Self { bytes })
    }
}

impl Serialize for RoomCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Connection ID: 13-byte fixed array ("conn_" + 8 hex), assigned once per socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    bytes: [u8; CONNECTION_ID_LEN],
}

impl ConnectionId {
    /// Next process-unique id.
    pub fn generate() -> Self {
        Self::from_value(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    fn from_value(value: u32) -> Self {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        bytes[..5].copy_from_slice(b"conn_");

        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            bytes[5 + i] = HEX_CHARS[nibble];
        }
        Self { bytes }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Which side of a session a connection is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Peer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Peer => "peer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
