//! The demo's shared state: pages and the pieces on them.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tablesync::prelude::*;

/// Full state of one piece, sent as JSON on `ADD_PIECE`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub page: u64,
    pub pos: Vec2,
    pub size: Vec2,
}

#[derive(Debug, Default)]
pub struct Board {
    pub pages: BTreeMap<u64, String>,
    pub pieces: BTreeMap<u64, Piece>,
}

pub type SharedBoard = Arc<Mutex<Board>>;

impl Board {
    /// A page with two pieces, so a fresh host has something to replay.
    pub fn starter() -> Self {
        let mut board = Board::default();
        board.pages.insert(1, "Dungeon".to_string());
        board.pieces.insert(
            10,
            Piece {
                page: 1,
                pos: Vec2::new(0.0, 0.0),
                size: Vec2::new(1.0, 1.0),
            },
        );
        board.pieces.insert(
            11,
            Piece {
                page: 1,
                pos: Vec2::new(3.0, 2.0),
                size: Vec2::new(2.0, 2.0),
            },
        );
        board
    }
}

/// Keeps `board` in step with every change arriving on the board channels.
///
/// Called before the transport starts, so nothing the host replays on
/// `JOIN` slips past.
pub fn track(endpoint: &mut PendingEndpoint, board: &SharedBoard) {
    let b = Arc::clone(board);
    endpoint.register_callback(channels::ADD_PAGE, move |m: Addressed<String>| {
        tracing::info!(page = m.entity_id, name = %m.payload, "page added");
        b.lock().pages.insert(m.entity_id, m.payload);
    });

    let b = Arc::clone(board);
    endpoint.register_callback(channels::ADD_PIECE, move |m: Addressed<Json<Piece>>| {
        let Json(piece) = m.payload;
        tracing::info!(piece = m.entity_id, page = piece.page, "piece added");
        b.lock().pieces.insert(m.entity_id, piece);
    });

    let b = Arc::clone(board);
    endpoint.register_callback(channels::DELETE_PIECE, move |m: Addressed<()>| {
        tracing::info!(piece = m.entity_id, "piece deleted");
        b.lock().pieces.remove(&m.entity_id);
    });

    let b = Arc::clone(board);
    endpoint.register_callback(channels::MOVE_PIECE, move |m: Addressed<Vec2>| {
        match b.lock().pieces.get_mut(&m.entity_id) {
            Some(piece) => piece.pos = m.payload,
            None => tracing::warn!(piece = m.entity_id, "move for unknown piece"),
        }
        tracing::info!(
            piece = m.entity_id,
            x = m.payload.x,
            y = m.payload.y,
            by = %m.sender_client_id,
            "piece moved"
        );
    });

    let b = Arc::clone(board);
    endpoint.register_callback(channels::RESIZE_PIECE, move |m: Addressed<Vec2>| {
        if let Some(piece) = b.lock().pieces.get_mut(&m.entity_id) {
            piece.size = m.payload;
        }
    });

    endpoint.register_callback(channels::CHAT_MSG, |m: Addressed<Json<ChatMessage>>| {
        let Json(line) = m.payload;
        tracing::info!(author = %line.author, "{}", line.text);
    });
}

/// Sends the whole board to one client.
pub fn replay<T: Transport>(
    endpoint: &mut Endpoint<T>,
    board: &Board,
    to: ClientId,
) -> Result<(), ReplicationError> {
    let recipient = Recipient::Client(to);
    for (&id, name) in &board.pages {
        endpoint.publish(channels::ADD_PAGE, id, name, recipient)?;
    }
    for (&id, piece) in &board.pieces {
        endpoint.publish(channels::ADD_PIECE, id, &Json(*piece), recipient)?;
    }
    tracing::info!(
        client_id = %to,
        pages = board.pages.len(),
        pieces = board.pieces.len(),
        "board replayed"
    );
    Ok(())
}

/// Placeholder artwork for a page, served through the image protocol.
pub fn page_art(page: u64) -> Bytes {
    Bytes::from(format!("<svg id=\"page-{page}\"/>"))
}
