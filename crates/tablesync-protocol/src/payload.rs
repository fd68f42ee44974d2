//! Typed payloads: how a channel's bytes map to a Rust value.
//!
//! Every implementation encodes field by field with a fixed byte order,
//! and every decode checks lengths first. A payload that is too short
//! or too long is an error value, never an out-of-bounds read.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ProtocolError, Vec2};

/// A value that can be carried as a channel payload.
///
/// Decoding takes `Bytes` by value so byte-oriented payloads (images,
/// opaque snapshots) can be handed on without copying.
pub trait Payload: Sized {
    /// Encodes the value.
    ///
    /// # Errors
    /// Only record payloads ([`Json`]) can fail to encode.
    fn encode_payload(&self) -> Result<Bytes, ProtocolError>;

    /// Decodes a value, rejecting input of the wrong shape.
    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError>;
}

/// Checks that `data` is exactly `len` bytes long.
fn expect_len(
    data: &Bytes,
    len: usize,
    what: &'static str,
) -> Result<(), ProtocolError> {
    if data.len() < len {
        return Err(ProtocolError::truncated(what, len, data.len()));
    }
    if data.len() > len {
        return Err(ProtocolError::InvalidMessage(format!(
            "{what}: expected {len} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}

impl Payload for Bytes {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        Ok(self.clone())
    }

    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError> {
        Ok(data)
    }
}

impl Payload for Vec<u8> {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::copy_from_slice(self))
    }

    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError> {
        Ok(data.to_vec())
    }
}

impl Payload for String {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }

    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError> {
        String::from_utf8(data.to_vec()).map_err(|e| {
            ProtocolError::InvalidMessage(format!("payload is not UTF-8: {e}"))
        })
    }
}

/// Empty payload, e.g. `DISCONNECT` and `CLIENT_DELETE`.
impl Payload for () {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::new())
    }

    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError> {
        expect_len(&data, 0, "empty payload")
    }
}

/// An id, e.g. the image id in `IMAGE_REQUEST`.
impl Payload for u64 {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::copy_from_slice(&self.to_le_bytes()))
    }

    fn decode_payload(mut data: Bytes) -> Result<Self, ProtocolError> {
        expect_len(&data, 8, "u64 payload")?;
        Ok(data.get_u64_le())
    }
}

impl Payload for Vec2 {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_f32_le(self.x);
        buf.put_f32_le(self.y);
        Ok(buf.freeze())
    }

    fn decode_payload(mut data: Bytes) -> Result<Self, ProtocolError> {
        expect_len(&data, 8, "vec2 payload")?;
        Ok(Vec2 {
            x: data.get_f32_le(),
            y: data.get_f32_le(),
        })
    }
}

// ---------------------------------------------------------------------------
// Json<T>
// ---------------------------------------------------------------------------

/// A record payload serialized with [`JsonCodec`](crate::JsonCodec).
///
/// Use it for structured payloads both ends define with serde, such as
/// [`ChatMessage`](crate::ChatMessage) or an application's page snapshot:
///
/// ```rust
/// use tablesync_protocol::{ChatMessage, Json, Payload};
///
/// let msg = Json(ChatMessage {
///     timestamp_ms: 1,
///     author: "ada".into(),
///     text: "hello".into(),
/// });
/// let bytes = msg.encode_payload().unwrap();
/// let back = Json::<ChatMessage>::decode_payload(bytes).unwrap();
/// assert_eq!(back.0.text, "hello");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

#[cfg(feature = "json")]
impl<T> Payload for Json<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        use crate::Codec;
        crate::JsonCodec.encode(&self.0).map(Bytes::from)
    }

    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError> {
        use crate::Codec;
        crate::JsonCodec.decode(&data).map(Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_rejects_short_and_long_input() {
        assert!(matches!(
            u64::decode_payload(Bytes::from_static(&[1, 2])),
            Err(ProtocolError::Truncated { needed: 8, got: 2, .. })
        ));
        assert!(matches!(
            u64::decode_payload(Bytes::from_static(&[0; 9])),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_u64_is_little_endian() {
        let bytes = 0x0102u64.encode_payload().unwrap();
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let err = String::decode_payload(Bytes::from_static(&[0xFF, 0xFE]))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_unit_rejects_non_empty() {
        assert!(<()>::decode_payload(Bytes::new()).is_ok());
        assert!(<()>::decode_payload(Bytes::from_static(b"x")).is_err());
    }

    #[test]
    fn test_vec2_layout() {
        let bytes = Vec2::new(1.5, -2.0).encode_payload().unwrap();
        assert_eq!(&bytes[..4], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn test_json_decode_mismatch_is_decode_error() {
        let err = Json::<crate::ChatMessage>::decode_payload(
            Bytes::from_static(b"{\"nope\":1}"),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }
}
