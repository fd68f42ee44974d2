//! Codec trait for record payloads.
//!
//! The fixed-layout parts of the protocol (frame header, envelope
//! prefix, ids, vectors) are hand-encoded in [`crate::frame`] and
//! [`crate::payload`]. Records whose shape is owned by the application,
//! like chat lines or page snapshots, go through a [`Codec`] instead, so
//! the format can change without touching the framing code.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// describe a different type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`). Backs [`crate::Json`].
///
/// ```rust
/// use tablesync_protocol::{ChatMessage, Codec, JsonCodec};
///
/// let msg = ChatMessage { timestamp_ms: 5000, author: "ada".into(), text: "gg".into() };
/// let bytes = JsonCodec.encode(&msg).unwrap();
/// let decoded: ChatMessage = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
