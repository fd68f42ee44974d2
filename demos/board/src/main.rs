//! A minimal shared board on top of tablesync.
//!
//! ```text
//! board host 0.0.0.0:7777
//! board join 127.0.0.1:7777 alice
//! ```
//!
//! Type a line to chat, `/move <piece> <x> <y>` to move a piece, or
//! `/quit` to leave. Set `RUST_LOG=debug` to watch the frames go by.

mod board;

use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tablesync::DEFAULT_ADDR;
use tablesync::prelude::*;
use tracing_subscriber::EnvFilter;

use board::{Board, SharedBoard};

const TICK: Duration = Duration::from_millis(50);

const USAGE: &str = "usage: board host <addr> | board join <addr> <name>";

// ---------------------------------------------------------------------------
// Console input
// ---------------------------------------------------------------------------

enum Command {
    Say(String),
    Move { piece: u64, to: Vec2 },
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == "/quit" {
        return Some(Command::Quit);
    }
    if let Some(rest) = line.strip_prefix("/move ") {
        let mut parts = rest.split_whitespace();
        let piece = parts.next()?.parse().ok()?;
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        return Some(Command::Move {
            piece,
            to: Vec2::new(x, y),
        });
    }
    Some(Command::Say(line.to_string()))
}

/// Reads stdin on its own thread so the tick loop never blocks on it.
fn console() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Next console command, `Some(Quit)` once stdin is closed.
fn next_command(input: &Receiver<String>) -> Option<Command> {
    loop {
        match input.try_recv() {
            Ok(line) => match parse_command(&line) {
                Some(command) => return Some(command),
                None if line.trim().is_empty() => continue,
                None => {
                    tracing::warn!(%line, "could not parse command");
                    continue;
                }
            },
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => return Some(Command::Quit),
        }
    }
}

fn chat_line(author: &str, text: String) -> Json<ChatMessage> {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    Json(ChatMessage {
        timestamp_ms,
        author: author.to_string(),
        text,
    })
}

/// Applies a console command to the board and publishes it.
///
/// Returns `false` on `/quit`.
fn run_command<T: Transport>(
    endpoint: &mut Endpoint<T>,
    board: &SharedBoard,
    name: &str,
    command: Command,
) -> Result<bool, TablesyncError> {
    match command {
        Command::Quit => return Ok(false),
        Command::Say(text) => {
            endpoint.publish(channels::CHAT_MSG, 0, &chat_line(name, text), Recipient::All)?;
        }
        Command::Move { piece, to } => {
            match board.lock().pieces.get_mut(&piece) {
                Some(p) => p.pos = to,
                None => {
                    tracing::warn!(piece, "no such piece");
                    return Ok(true);
                }
            }
            endpoint.publish(channels::MOVE_PIECE, piece, &to, Recipient::All)?;
        }
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Logs who came and went since the last call.
fn log_roster_changes(previous: &mut Vec<ClientInfo>, current: Vec<ClientInfo>) {
    for c in current.iter().filter(|c| !previous.contains(c)) {
        tracing::info!(client_id = %c.client_id, name = %c.name, "joined the table");
    }
    for c in previous.iter().filter(|c| !current.contains(c)) {
        tracing::info!(client_id = %c.client_id, name = %c.name, "left the table");
    }
    *previous = current;
}

fn log_rejections(report: &UpdateReport) {
    for err in &report.rejected {
        tracing::warn!(error = %err, "change rejected");
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

fn run_host(addr: &str) -> Result<(), TablesyncError> {
    let board: SharedBoard = Arc::new(Mutex::new(Board::starter()));
    let newcomers = Arc::new(Mutex::new(Vec::new()));

    let mut endpoint = Tablesync::builder()
        .bind(addr)
        .session_name("board demo")
        .host_name("gm")
        .host_with(|setup| {
            board::track(setup, &board);
            let newcomers = Arc::clone(&newcomers);
            setup.register_callback(channels::JOIN, move |m: Addressed<String>| {
                newcomers.lock().push(ClientId(m.entity_id));
            });
        })?;

    for &page in board.lock().pages.keys() {
        endpoint.upload_image(page, board::page_art(page));
    }

    let input = console();
    let mut roster = Vec::new();
    loop {
        let report = endpoint.update();
        log_rejections(&report);

        let joined: Vec<ClientId> = newcomers.lock().drain(..).collect();
        for id in joined {
            let snapshot = board.lock();
            board::replay(&mut endpoint, &snapshot, id)?;
        }
        log_roster_changes(&mut roster, endpoint.connected_clients());

        if let Some(command) = next_command(&input) {
            if !run_command(&mut endpoint, &board, "gm", command)? {
                break;
            }
        }
        thread::sleep(TICK);
    }

    endpoint.update();
    endpoint.transport().shutdown();
    tracing::info!("host stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

fn run_client(addr: &str, name: &str) -> Result<(), TablesyncError> {
    let board: SharedBoard = Arc::default();
    let mut endpoint = Tablesync::builder()
        .connect(addr)
        .display_name(name)
        .join_with(|setup| board::track(setup, &board))?;
    tracing::info!(
        client_id = %endpoint.local_id(),
        host = %endpoint.transport().peer_addr(),
        "connected"
    );

    let input = console();
    let mut roster = Vec::new();
    let mut asked = HashSet::new();
    let mut was_joined = false;
    loop {
        let report = endpoint.update();
        log_rejections(&report);

        if endpoint.is_joined() && !was_joined {
            if let Some(session) = endpoint.session() {
                tracing::info!(session = %session.session_name, "joined session");
            }
        }
        if was_joined && !endpoint.is_joined() {
            tracing::warn!("host went away");
            break;
        }
        was_joined = endpoint.is_joined();
        log_roster_changes(&mut roster, endpoint.connected_clients());

        let pages: Vec<u64> = board.lock().pages.keys().copied().collect();
        for page in pages {
            if asked.insert(page) && endpoint.request_image(page).is_some() {
                tracing::info!(page, "page art already cached");
            }
        }

        if let Some(command) = next_command(&input) {
            if !run_command(&mut endpoint, &board, name, command)? {
                endpoint.leave()?;
                endpoint.update();
                break;
            }
        }
        thread::sleep(TICK);
    }

    let art = board.lock().pages.keys().filter(|&&p| endpoint.image(p).is_some()).count();
    tracing::info!(pieces = board.lock().pieces.len(), pages_with_art = art, "left the table");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["host"] => run_host(DEFAULT_ADDR)?,
        ["host", addr] => run_host(addr)?,
        ["join", addr, name] => run_client(addr, name)?,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
    Ok(())
}
