//! Identity and record types shared by every tablesync layer.
//!
//! None of these know anything about sockets. They describe WHO is
//! talking ([`ClientId`], [`ClientInfo`]), WHERE a change should go
//! ([`Recipient`]), and the few records the replication layer itself
//! understands (sessions, pending image requests, chat lines).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one participant of a shared board.
///
/// A newtype over `u64` so a client id can never be confused with an
/// entity id (piece, page, image), which are plain `u64`s on the wire.
/// `Ord` matters: the roster is kept sorted by id.
///
/// Id 0 is reserved for the host. On an outbound frame header it also
/// doubles as the "every peer" marker; see [`Recipient::All`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl ClientId {
    /// The authoritative host. Always present in the host's roster.
    pub const HOST: ClientId = ClientId(0);

    /// Returns `true` for the reserved host id.
    pub fn is_host(self) -> bool {
        self == Self::HOST
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive an outbound change?
// ---------------------------------------------------------------------------

/// Addressing for an outbound change.
///
/// The wire only knows "sender id 0 means broadcast"; this enum is the
/// typed form the endpoint and transport pass around instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connected peer.
    #[default]
    All,

    /// Exactly one peer.
    Client(ClientId),

    /// Every connected peer except one. Used to relay a change to
    /// everybody but the client that produced it.
    AllExcept(ClientId),
}

impl Recipient {
    /// Returns `true` if a peer with this id should receive the message.
    pub fn includes(&self, client: ClientId) -> bool {
        match *self {
            Recipient::All => true,
            Recipient::Client(target) => target == client,
            Recipient::AllExcept(excluded) => excluded != client,
        }
    }
}

// ---------------------------------------------------------------------------
// Roster and session records
// ---------------------------------------------------------------------------

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// The participant's id. 0 is the host.
    pub client_id: ClientId,
    /// Display name chosen when joining.
    pub name: String,
}

impl ClientInfo {
    pub fn new(client_id: ClientId, name: impl Into<String>) -> Self {
        Self {
            client_id,
            name: name.into(),
        }
    }
}

/// The session a client joined, as announced by the host in `JOIN_ACCEPT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: u64,
    pub session_name: String,
}

/// An image someone asked for before anybody had uploaded it.
///
/// The host keeps these until a matching `NEW_IMAGE` arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingImageRequest {
    pub image_id: u64,
    pub requester: ClientId,
}

// ---------------------------------------------------------------------------
// Payload records
// ---------------------------------------------------------------------------

/// A chat line, carried as JSON on `CHAT_MSG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Milliseconds since the Unix epoch, stamped by the author.
    pub timestamp_ms: u64,
    pub author: String,
    pub text: String,
}

/// A 2D position or size, as used by `MOVE_PIECE` and `RESIZE_PIECE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
