use engine::board::BOARD_SIZE;
use engine::piece::{Origin, Piece, Player};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Inbound messages that spent longer than this in transit are flagged stale.
pub const STALE_AFTER_MS: u64 = 3_000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Message {
    /// A placement completed on the sender's board.
    Move {
        x: u8,
        y: u8,
        piece: Option<Piece>,
        origin: Option<Origin>,
    },
    /// The sender picked up a piece (`piece` set) or put it back (`None`).
    Select {
        piece: Option<Piece>,
        origin: Option<Origin>,
    },
    /// Guest's signal that its side of the session is ready.
    Ready,
    /// Host's authoritative opening state, the reply to `Ready`.
    GameState { current_player: Player },
    /// Periodic liveness probe.
    Heartbeat { id: u64 },
    /// The sender restarted the game.
    Reset,
}

impl Message {
    /// Short lowercase name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Move { .. } => "move",
            Message::Select { .. } => "select",
            Message::Ready => "ready",
            Message::GameState { .. } => "game_state",
            Message::Heartbeat { .. } => "heartbeat",
            Message::Reset => "reset",
        }
    }
}

/// Wire form: every message travels wrapped with its send timestamp.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub sent_at: u64,
    pub message: Message,
}

/// A decoded message together with its transit timing.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub message: Message,
    pub sent_at: u64,
    pub delay_ms: u64,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Bytes did not decode to a known envelope.
    Malformed(String),
    /// Decoded fine but names a cell outside the board.
    OutOfRange { x: u8, y: u8 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(reason) => write!(f, "malformed message: {}", reason),
            ProtocolError::OutOfRange { x, y } => {
                write!(f, "cell ({}, {}) is outside the board", x, y)
            }
        }
    }
}

impl Error for ProtocolError {}

/// Encodes a message stamped with the current time.
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    encode_at(message, get_timestamp())
}

/// Encodes with an explicit timestamp, for deterministic tests.
pub fn encode_at(message: &Message, sent_at: u64) -> Result<Vec<u8>, ProtocolError> {
    let envelope = Envelope {
        sent_at,
        message: message.clone(),
    };
    bincode::serialize(&envelope).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Decodes one envelope, computing transit delay against the current time.
/// Coordinates carried by `Move` and `Select` are range-checked here so that
/// a misbehaving peer cannot push an out-of-board placement into the engine.
pub fn decode(bytes: &[u8]) -> Result<Inbound, ProtocolError> {
    decode_at(bytes, get_timestamp())
}

/// Decodes with an explicit receive timestamp, for deterministic tests.
pub fn decode_at(bytes: &[u8], received_at: u64) -> Result<Inbound, ProtocolError> {
    let envelope: Envelope =
        bincode::deserialize(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    validate(&envelope.message)?;
    // A peer clock ahead of ours would otherwise underflow the delay
    let delay_ms = received_at.saturating_sub(envelope.sent_at);
    Ok(Inbound {
        message: envelope.message,
        sent_at: envelope.sent_at,
        delay_ms,
        stale: delay_ms > STALE_AFTER_MS,
    })
}

fn validate(message: &Message) -> Result<(), ProtocolError> {
    match message {
        Message::Move { x, y, origin, .. } => {
            check_cell(*x, *y)?;
            check_origin(origin)
        }
        Message::Select { origin, .. } => check_origin(origin),
        _ => Ok(()),
    }
}

fn check_origin(origin: &Option<Origin>) -> Result<(), ProtocolError> {
    match origin {
        Some(Origin::Board { x, y }) => check_cell(*x, *y),
        _ => Ok(()),
    }
}

fn check_cell(x: u8, y: u8) -> Result<(), ProtocolError> {
    if x < BOARD_SIZE && y < BOARD_SIZE {
        Ok(())
    } else {
        Err(ProtocolError::OutOfRange { x, y })
    }
}

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
