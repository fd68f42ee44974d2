//! The fixed-size frame header that prefixes every message on the wire.
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────────────────┬──────────────┐
//! │ sender id    │ body length  │ channel name          │ body         │
//! │ u64 LE (8)   │ u64 LE (8)   │ zero-padded (16)      │ (body length)│
//! └──────────────┴──────────────┴───────────────────────┴──────────────┘
//! ```
//!
//! Fields are written one by one in little-endian order. Nothing here
//! depends on struct layout or the host platform.
//!
//! The channel field is 16 bytes wide. A longer name is cut to the
//! longest prefix that fits (on a UTF-8 character boundary), so two long
//! names that share that prefix end up on the same channel. This is
//! logged when it happens; callers that build channel names dynamically
//! should check [`ChannelName::fits`] first.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ClientId, ProtocolError};

/// Width of the channel name field.
pub const CHANNEL_NAME_LEN: usize = 16;

/// Total header size: sender id + body length + channel name.
pub const HEADER_LEN: usize = 8 + 8 + CHANNEL_NAME_LEN;

/// Largest body a peer may announce before the header is rejected.
///
/// A corrupted length field would otherwise make the reader try to
/// allocate and wait for gigabytes that never arrive.
pub const DEFAULT_MAX_BODY_LEN: u64 = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
// ChannelName
// ---------------------------------------------------------------------------

/// A channel name that is guaranteed to fit the header field.
///
/// Construct with [`ChannelName::new`] (or `From<&str>`), which truncates.
/// Two names compare equal if their on-wire forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Normalises `name` to its on-wire form.
    ///
    /// The name is cut at the first NUL byte (the wire can't carry one)
    /// and then to at most [`CHANNEL_NAME_LEN`] bytes.
    pub fn new(name: &str) -> Self {
        let name = name.split('\0').next().unwrap_or_default();
        if name.len() <= CHANNEL_NAME_LEN {
            return Self(name.to_owned());
        }

        let mut end = CHANNEL_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let truncated = &name[..end];
        tracing::warn!(
            channel = name,
            truncated,
            "channel name longer than {CHANNEL_NAME_LEN} bytes, truncating"
        );
        Self(truncated.to_owned())
    }

    /// Returns `true` if `name` survives the wire unchanged.
    pub fn fits(name: &str) -> bool {
        name.len() <= CHANNEL_NAME_LEN && !name.contains('\0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Writes the zero-padded field.
    fn to_field(&self) -> [u8; CHANNEL_NAME_LEN] {
        let mut field = [0u8; CHANNEL_NAME_LEN];
        let bytes = self.0.as_bytes();
        field[..bytes.len()].copy_from_slice(bytes);
        field
    }

    /// Reads the zero-padded field back, checking that it is well formed.
    fn from_field(
        field: &[u8; CHANNEL_NAME_LEN],
    ) -> Result<Self, ProtocolError> {
        let end = field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CHANNEL_NAME_LEN);

        if end == 0 {
            return Err(ProtocolError::InvalidHeader(
                "empty channel name".into(),
            ));
        }
        if field[end..].iter().any(|&b| b != 0) {
            return Err(ProtocolError::InvalidHeader(
                "non-zero bytes after channel name padding".into(),
            ));
        }

        let name = std::str::from_utf8(&field[..end]).map_err(|e| {
            ProtocolError::InvalidHeader(format!(
                "channel name is not UTF-8: {e}"
            ))
        })?;
        Ok(Self(name.to_owned()))
    }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// FrameHeader
// ---------------------------------------------------------------------------

/// The decoded 32-byte header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Who sent the frame. On frames written by the host this is the
    /// recipient's own id (broadcast copies are re-stamped per peer).
    pub sender_id: ClientId,
    /// Number of body bytes that follow the header.
    pub body_len: u64,
    /// Which channel the body belongs to.
    pub channel: ChannelName,
}

impl FrameHeader {
    /// Appends the header to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN);
        buf.put_u64_le(self.sender_id.0);
        buf.put_u64_le(self.body_len);
        buf.put_slice(&self.channel.to_field());
    }

    /// Decodes a header and checks it before any body byte is read.
    ///
    /// The returned `body_len` is how many bytes the caller must read
    /// next. Rejected headers (empty or garbled channel field, oversized
    /// body) mean the stream is out of sync and the connection should be
    /// dropped.
    pub fn decode(
        raw: &[u8; HEADER_LEN],
        max_body_len: u64,
    ) -> Result<Self, ProtocolError> {
        let mut buf = &raw[..];
        let sender_id = ClientId(buf.get_u64_le());
        let body_len = buf.get_u64_le();

        let mut field = [0u8; CHANNEL_NAME_LEN];
        buf.copy_to_slice(&mut field);
        let channel = ChannelName::from_field(&field)?;

        if body_len > max_body_len {
            return Err(ProtocolError::BodyTooLarge {
                len: body_len,
                max: max_body_len,
            });
        }

        Ok(Self {
            sender_id,
            body_len,
            channel,
        })
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A whole message: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    /// Decodes a complete frame held in one buffer.
    ///
    /// The stream reader in the transport reads header and body
    /// separately; this is for callers that already have the whole thing.
    pub fn decode(data: &[u8], max_body_len: u64) -> Result<Self, ProtocolError> {
        let raw: &[u8; HEADER_LEN] = data
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| {
                ProtocolError::truncated("frame header", HEADER_LEN, data.len())
            })?;
        let header = FrameHeader::decode(raw, max_body_len)?;

        let rest = &data[HEADER_LEN..];
        let body_len = usize::try_from(header.body_len).map_err(|_| {
            ProtocolError::BodyTooLarge {
                len: header.body_len,
                max: max_body_len,
            }
        })?;
        if rest.len() < body_len {
            return Err(ProtocolError::truncated(
                "frame body",
                body_len,
                rest.len(),
            ));
        }
        if rest.len() > body_len {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} trailing bytes after frame body",
                rest.len() - body_len
            )));
        }

        Ok(Self {
            header,
            body: Bytes::copy_from_slice(rest),
        })
    }
}

/// Encodes a frame: header followed by `body`.
pub fn encode_frame(
    sender_id: ClientId,
    channel: &ChannelName,
    body: &[u8],
) -> Bytes {
    let header = FrameHeader {
        sender_id,
        body_len: body.len() as u64,
        channel: channel.clone(),
    };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    header.encode_into(&mut buf);
    buf.put_slice(body);
    buf.freeze()
}
