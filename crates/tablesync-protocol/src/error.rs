//! Error types for the protocol layer.
//!
//! Each tablesync crate defines its own error enum. A `ProtocolError`
//! always means "these bytes don't mean what they should": a bad frame
//! header, a payload that is too short, or a record that failed to
//! (de)serialize. It never means a socket went away.

/// Errors that can occur while encoding or decoding wire data.
///
/// `#[derive(thiserror::Error)]` generates the `std::error::Error` impl;
/// each `#[error("...")]` attribute is the message shown in logs.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a record payload failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserializing a record payload failed.
    ///
    /// Common causes: the two ends disagree on the payload shape of a
    /// channel, or the sender published a different record type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The input ended before a fixed-size field could be read.
    ///
    /// Replaces the out-of-bounds read a raw struct copy would do on a
    /// short buffer.
    #[error("truncated {what}: need {needed} bytes, got {got}")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    /// A frame header failed its integrity checks.
    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    /// A frame header announced a body larger than the configured bound.
    #[error("frame body of {len} bytes exceeds the {max} byte limit")]
    BodyTooLarge { len: u64, max: u64 },

    /// The bytes decoded, but violate a payload contract (wrong length,
    /// bad UTF-8, trailing data).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Shorthand for the common "need N bytes, got M" case.
    pub(crate) fn truncated(what: &'static str, needed: usize, got: usize) -> Self {
        Self::Truncated { what, needed, got }
    }
}
