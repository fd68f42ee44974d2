//! The addressed envelope carried in most frame bodies.
//!
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────────┐
//! │ entity id    │ sender client id │ payload              │
//! │ u64 LE (8)   │ u64 LE (8)       │ channel-specific     │
//! └──────────────┴──────────────────┴──────────────────────┘
//! ```
//!
//! The envelope does not say what its payload is. Both ends agree on
//! that per channel (see [`crate::channels`]); [`Envelope::parse`] turns
//! the bytes into the agreed type and reports a mismatch as an error.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ClientId, Payload, ProtocolError};

/// Size of the fixed envelope prefix.
pub const ENVELOPE_PREFIX_LEN: usize = 16;

/// A change to one logical object, tagged with who made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The object being changed: a piece, page, image, or client.
    pub entity_id: u64,
    /// The client that produced the change. The host uses this to avoid
    /// echoing a change back to its origin.
    pub sender_client_id: ClientId,
    /// Opaque, channel-specific bytes.
    pub payload: Bytes,
}

/// An envelope whose payload has been decoded into `P`.
#[derive(Debug, Clone, PartialEq)]
pub struct Addressed<P> {
    pub entity_id: u64,
    pub sender_client_id: ClientId,
    pub payload: P,
}

impl Envelope {
    pub fn new(
        entity_id: u64,
        sender_client_id: ClientId,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            entity_id,
            sender_client_id,
            payload: payload.into(),
        }
    }

    /// Builds an envelope around a typed payload.
    pub fn with_payload<P: Payload>(
        entity_id: u64,
        sender_client_id: ClientId,
        payload: &P,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(entity_id, sender_client_id, payload.encode_payload()?))
    }

    /// Serializes the envelope: 16-byte prefix, then the payload.
    pub fn encode(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(ENVELOPE_PREFIX_LEN + self.payload.len());
        buf.put_u64_le(self.entity_id);
        buf.put_u64_le(self.sender_client_id.0);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parses an envelope out of a frame body.
    ///
    /// Takes `Bytes` so the payload is a zero-copy slice of the body.
    ///
    /// # Errors
    /// [`ProtocolError::Truncated`] if the body is shorter than the
    /// 16-byte prefix.
    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        if body.len() < ENVELOPE_PREFIX_LEN {
            return Err(ProtocolError::truncated(
                "envelope prefix",
                ENVELOPE_PREFIX_LEN,
                body.len(),
            ));
        }
        let entity_id = body.get_u64_le();
        let sender_client_id = ClientId(body.get_u64_le());
        Ok(Self {
            entity_id,
            sender_client_id,
            payload: body,
        })
    }

    /// Decodes the payload as `P`, keeping the addressing.
    pub fn parse<P: Payload>(&self) -> Result<Addressed<P>, ProtocolError> {
        Ok(Addressed {
            entity_id: self.entity_id,
            sender_client_id: self.sender_client_id,
            payload: P::decode_payload(self.payload.clone())?,
        })
    }
}

impl<P: Payload> Addressed<P> {
    pub fn new(entity_id: u64, sender_client_id: ClientId, payload: P) -> Self {
        Self {
            entity_id,
            sender_client_id,
            payload,
        }
    }

    /// Re-encodes into a raw envelope.
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        Envelope::with_payload(
            self.entity_id,
            self.sender_client_id,
            &self.payload,
        )
    }
}

// An envelope is itself a payload, which is what lets the bus hand out
// `Envelope`s (or `Addressed<T>`s) straight from raw frame bodies.
impl Payload for Envelope {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        Ok(self.encode())
    }

    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError> {
        Envelope::decode(data)
    }
}

impl<P: Payload> Payload for Addressed<P> {
    fn encode_payload(&self) -> Result<Bytes, ProtocolError> {
        Ok(self.to_envelope()?.encode())
    }

    fn decode_payload(data: Bytes) -> Result<Self, ProtocolError> {
        Envelope::decode(data)?.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec2;

    #[test]
    fn test_encode_prefix_layout() {
        let env = Envelope::new(7, ClientId(3), Bytes::from_static(b"abc"));
        let bytes = env.encode();

        assert_eq!(bytes.len(), ENVELOPE_PREFIX_LEN + 3);
        assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &3u64.to_le_bytes());
        assert_eq!(&bytes[16..], b"abc");
    }

    #[test]
    fn test_decode_empty_payload() {
        let env = Envelope::new(9, ClientId(1), Bytes::new());
        let decoded = Envelope::decode(env.encode()).unwrap();
        assert_eq!(decoded, env);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_decode_short_body_is_error_not_panic() {
        let err = Envelope::decode(Bytes::from_static(&[1, 2, 3])).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated { needed: 16, got: 3, .. }
        ));
    }

    #[test]
    fn test_parse_typed_payload() {
        let env =
            Envelope::with_payload(7, ClientId(2), &Vec2::new(10.0, 20.0))
                .unwrap();
        let parsed: Addressed<Vec2> = env.parse().unwrap();

        assert_eq!(parsed.entity_id, 7);
        assert_eq!(parsed.sender_client_id, ClientId(2));
        assert_eq!(parsed.payload, Vec2::new(10.0, 20.0));
    }

    #[test]
    fn test_parse_wrong_shape_is_error() {
        // A position is 8 bytes; a 3-byte payload can't be one.
        let env = Envelope::new(7, ClientId(2), Bytes::from_static(b"abc"));
        assert!(env.parse::<Vec2>().is_err());
    }

    #[test]
    fn test_addressed_decodes_straight_from_body() {
        let body = Envelope::with_payload(5, ClientId(4), &"hi".to_string())
            .unwrap()
            .encode();
        let addressed = Addressed::<String>::decode_payload(body).unwrap();
        assert_eq!(addressed.payload, "hi");
        assert_eq!(addressed.entity_id, 5);
    }
}
