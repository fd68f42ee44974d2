//! The reserved channel catalog.
//!
//! | Channel | `entity_id` | Payload |
//! |---|---|---|
//! | `JOIN` | joining client id (host side) | display name (`String`) |
//! | `JOIN_ACCEPT` | session id | session name (`String`) |
//! | `CLIENT_ADD` | client id | display name (`String`) |
//! | `CLIENT_DELETE` | client id | `()` |
//! | `ADD_PIECE`, `DELETE_PIECE` | piece id | application snapshot |
//! | `MOVE_PIECE`, `RESIZE_PIECE` | piece id | [`Vec2`](crate::Vec2) |
//! | `ADD_PAGE` | page id | application snapshot |
//! | `IMAGE_REQUEST` | image id | image id (`u64`) |
//! | `NEW_IMAGE` | image id | raw image bytes |
//! | `CHAT_MSG` | 0 | [`Json`](crate::Json)`<`[`ChatMessage`](crate::ChatMessage)`>` |
//! | `DISCONNECT` | departed client id (0 = host lost) | `()` |
//! | `LEAVE` | leaving client id | `()` |
//! | `PLAYER_VIEW` | page id | `()` |
//!
//! On the wire `JOIN` is the one exception to the envelope rule: the
//! client sends its bare display name and the host transport wraps it.

pub const JOIN: &str = "JOIN";
pub const JOIN_ACCEPT: &str = "JOIN_ACCEPT";
pub const CLIENT_ADD: &str = "CLIENT_ADD";
pub const CLIENT_DELETE: &str = "CLIENT_DELETE";
pub const ADD_PIECE: &str = "ADD_PIECE";
pub const DELETE_PIECE: &str = "DELETE_PIECE";
pub const MOVE_PIECE: &str = "MOVE_PIECE";
pub const RESIZE_PIECE: &str = "RESIZE_PIECE";
pub const ADD_PAGE: &str = "ADD_PAGE";
pub const IMAGE_REQUEST: &str = "IMAGE_REQUEST";
pub const NEW_IMAGE: &str = "NEW_IMAGE";
pub const CHAT_MSG: &str = "CHAT_MSG";
pub const DISCONNECT: &str = "DISCONNECT";
pub const LEAVE: &str = "LEAVE";
/// Host-only: tells one viewer which page to show.
pub const PLAYER_VIEW: &str = "PLAYER_VIEW";

/// Channels the host relays from their origin to every other client.
pub const FORWARDED: [&str; 6] = [
    ADD_PIECE,
    DELETE_PIECE,
    MOVE_PIECE,
    RESIZE_PIECE,
    ADD_PAGE,
    CHAT_MSG,
];

/// Every reserved channel.
pub const RESERVED: [&str; 15] = [
    JOIN,
    JOIN_ACCEPT,
    CLIENT_ADD,
    CLIENT_DELETE,
    ADD_PIECE,
    DELETE_PIECE,
    MOVE_PIECE,
    RESIZE_PIECE,
    ADD_PAGE,
    IMAGE_REQUEST,
    NEW_IMAGE,
    CHAT_MSG,
    DISCONNECT,
    LEAVE,
    PLAYER_VIEW,
];

/// Returns `true` if the host relays `channel` between clients.
pub fn is_forwarded(channel: &str) -> bool {
    FORWARDED.contains(&channel)
}
