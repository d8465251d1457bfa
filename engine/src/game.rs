use crate::board::{Board, LINES};
use crate::piece::{Hand, Origin, Piece, PieceId, PieceSize, Player};
use log::{debug, info};
use rand::Rng;
use std::error::Error;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Overall game progress. Terminal states are sticky: once the game is won
/// or drawn, placements are refused until a reset builds a fresh engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Playing,
    Won(Player),
    Draw,
}

/// The piece currently picked up, if any, and where it came from.
/// Transient: every call to [`GameEngine::select_piece`] overwrites it and
/// every placement attempt clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub piece: Option<Piece>,
    pub origin: Origin,
    /// Epoch milliseconds of the most recent selection, if any.
    pub selected_at: Option<u64>,
}

impl Selection {
    fn empty() -> Self {
        Self {
            piece: None,
            origin: Origin::Hand,
            selected_at: None,
        }
    }
}

/// One completed placement, appended to the move history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRecord {
    pub player: Player,
    pub from: Origin,
    pub x: u8,
    pub y: u8,
    pub piece: Piece,
}

/// Why a placement was refused. The board, hands, and turn are untouched
/// whenever one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceError {
    /// The game already ended; reset to play again.
    GameOver,
    /// No piece is selected.
    NoSelection,
    /// The selected piece does not belong to the current player.
    NotYourTurn,
    /// Destination coordinates are outside the 3×3 grid.
    OutOfBounds,
    /// The destination's visible piece is not strictly smaller.
    Blocked,
    /// Hand-sourced placement but no piece of that size remains in hand.
    OutOfPieces,
}

impl fmt::Display for PlaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PlaceError::GameOver => "the game is already over",
            PlaceError::NoSelection => "no piece is selected",
            PlaceError::NotYourTurn => "the selected piece is not the current player's",
            PlaceError::OutOfBounds => "destination is outside the board",
            PlaceError::Blocked => "destination piece is not strictly smaller",
            PlaceError::OutOfPieces => "no piece of that size left in hand",
        };
        write!(f, "{}", reason)
    }
}

impl Error for PlaceError {}

/// The rules engine: board, hand inventories, selection, turn order,
/// win/draw status, and the append-only move history.
///
/// An engine instance knows nothing about the network. A reset replaces the
/// whole state with a freshly constructed one rather than mutating pieces of
/// it back to their initial values.
#[derive(Debug, Clone)]
pub struct GameEngine {
    board: Board,
    hands: [Hand; 2],
    current_player: Player,
    selection: Selection,
    status: GameStatus,
    history: Vec<MoveRecord>,
    next_piece_id: u32,
}

impl GameEngine {
    /// Fresh game with a randomly chosen first player.
    pub fn new() -> Self {
        let first = if rand::thread_rng().gen_bool(0.5) {
            Player::One
        } else {
            Player::Two
        };
        Self::with_first_player(first)
    }

    /// Fresh game with a fixed first player. Used by tests and by callers
    /// that resolve the first player externally.
    pub fn with_first_player(first: Player) -> Self {
        Self {
            board: Board::new(),
            hands: [Hand::full(), Hand::full()],
            current_player: first,
            selection: Selection::empty(),
            status: GameStatus::Playing,
            history: Vec::new(),
            next_piece_id: 1,
        }
    }

    /// Materializes a new piece for `owner`, consuming the next unique id.
    /// Callers use this to turn a hand slot into a selectable piece; the
    /// hand count itself is only touched when the piece is placed.
    pub fn create_piece(&mut self, size: PieceSize, owner: Player) -> Piece {
        let id = PieceId(self.next_piece_id);
        self.next_piece_id += 1;
        Piece { id, size, owner }
    }

    /// Records the current selection. Never validates and never fails;
    /// any prior selection is overwritten.
    pub fn select_piece(&mut self, piece: Option<Piece>, origin: Origin) {
        self.selection = Selection {
            piece,
            origin,
            selected_at: Some(get_timestamp()),
        };
    }

    fn clear_selection(&mut self) {
        self.selection = Selection::empty();
    }

    /// Attempts to place the selected piece at `(x, y)`.
    ///
    /// On success the piece is removed from its origin (hand count
    /// decremented, or the origin cell's top popped), pushed onto the
    /// destination stack, the move is recorded, the selection cleared, and
    /// the win/draw status re-evaluated; if the game is still running the
    /// turn passes to the other player. The returned record carries
    /// everything a caller needs to relay the move to a remote peer.
    ///
    /// On failure nothing changes, including the selection's piece; callers
    /// decide whether to keep or drop the selection.
    pub fn place_piece(&mut self, x: u8, y: u8) -> Result<MoveRecord, PlaceError> {
        if self.status != GameStatus::Playing {
            return Err(PlaceError::GameOver);
        }
        let piece = self.selection.piece.ok_or(PlaceError::NoSelection)?;
        if piece.owner != self.current_player {
            return Err(PlaceError::NotYourTurn);
        }
        let dest = self.board.cell(x, y).ok_or(PlaceError::OutOfBounds)?;
        if !dest.can_accept(&piece) {
            return Err(PlaceError::Blocked);
        }
        let from = self.selection.origin;
        if from == Origin::Hand && self.hands[piece.owner.index()].remaining(piece.size) == 0 {
            return Err(PlaceError::OutOfPieces);
        }

        // All checks passed; mutate.
        match from {
            Origin::Hand => {
                self.hands[piece.owner.index()].remove(piece.size);
            }
            Origin::Board { x: fx, y: fy } => {
                // Only the top piece is ever selectable, so consuming the
                // top is sufficient; the engine does not re-verify identity.
                if let Some(cell) = self.board.cell_mut(fx, fy) {
                    cell.pop();
                }
            }
        }
        if let Some(cell) = self.board.cell_mut(x, y) {
            cell.push(piece);
        }

        let record = MoveRecord {
            player: self.current_player,
            from,
            x,
            y,
            piece,
        };
        self.history.push(record);
        self.clear_selection();
        debug!(
            "{} placed {} at ({}, {})",
            record.player, piece.size, x, y
        );

        self.check_winner();
        if self.status == GameStatus::Playing {
            self.current_player = self.current_player.opponent();
        }
        Ok(record)
    }

    /// Re-evaluates win/draw from the whole board. Lines are scanned in the
    /// fixed order of [`LINES`] (rows, columns, diagonals); the first line
    /// whose three visible pieces share an owner wins and ends the scan. A
    /// fully covered board with no winning line is a draw. Safe to call any
    /// number of times; a running game stays `Playing`.
    pub fn check_winner(&mut self) {
        for line in LINES {
            let [a, b, c] = line.map(|(x, y)| self.top_owner(x, y));
            match (a, b, c) {
                (Some(first), Some(second), Some(third)) if first == second && second == third => {
                    self.status = GameStatus::Won(first);
                    info!("Game over: {} wins", first);
                    return;
                }
                _ => {}
            }
        }
        if self.board.is_full() {
            self.status = GameStatus::Draw;
            info!("Game over: draw");
        }
    }

    /// Replaces the entire state with a freshly constructed game, including
    /// a new random first player.
    pub fn reset(&mut self) {
        *self = Self::new();
        info!("Game reset, {} moves first", self.current_player);
    }

    /// Overwrites the current player. This is the synchronization hook used
    /// when the host's authoritative first-player choice arrives; normal
    /// turn alternation never goes through here.
    pub fn set_current_player(&mut self, player: Player) {
        self.current_player = player;
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn top_piece(&self, x: u8, y: u8) -> Option<&Piece> {
        self.board.cell(x, y).and_then(|cell| cell.top())
    }

    fn top_owner(&self, x: u8, y: u8) -> Option<Player> {
        self.top_piece(x, y).map(|piece| piece.owner)
    }

    pub fn hand(&self, player: Player) -> &Hand {
        &self.hands[player.index()]
    }

    pub fn current_player(&self) -> Player {
        self.current_player
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn winner(&self) -> Option<Player> {
        match self.status {
            GameStatus::Won(player) => Some(player),
            _ => None,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
