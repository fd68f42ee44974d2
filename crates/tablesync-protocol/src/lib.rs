//! Wire protocol for tablesync.
//!
//! This crate defines the bytes that travel between a host and its
//! clients:
//!
//! - **Frames** ([`FrameHeader`], [`encode_frame`]): the fixed 32-byte
//!   header (sender id, body length, channel name) in front of every
//!   message.
//! - **Envelopes** ([`Envelope`], [`Addressed`]): the `(entity id,
//!   sender client id, payload)` triple most channels carry.
//! - **Payloads** ([`Payload`], [`Json`]): typed views over the opaque
//!   envelope payload.
//! - **Channels** ([`channels`]): the reserved channel names and what
//!   each one carries.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets or subscribers:
//!
//! ```text
//! Transport (sockets) → Protocol (frames, envelopes) → Bus (mailboxes) → Endpoint
//! ```

pub mod channels;
mod codec;
mod envelope;
mod error;
mod frame;
mod payload;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use envelope::{Addressed, ENVELOPE_PREFIX_LEN, Envelope};
pub use error::ProtocolError;
pub use frame::{
    CHANNEL_NAME_LEN, ChannelName, DEFAULT_MAX_BODY_LEN, Frame, FrameHeader,
    HEADER_LEN, encode_frame,
};
#[cfg(feature = "json")]
pub use payload::Json;
pub use payload::Payload;
pub use types::{
    ChatMessage, ClientId, ClientInfo, PendingImageRequest, Recipient,
    SessionInfo, Vec2,
};
