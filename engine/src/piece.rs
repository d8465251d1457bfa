use serde::{Deserialize, Serialize};
use std::fmt;

/// Pieces of each size a player starts with in hand.
pub const PIECES_PER_SIZE: u8 = 2;

/// Piece sizes. Declaration order gives the strict ordering
/// `Small < Medium < Large` used by the covering rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PieceSize {
    Small,
    Medium,
    Large,
}

impl PieceSize {
    pub const ALL: [PieceSize; 3] = [PieceSize::Small, PieceSize::Medium, PieceSize::Large];
}

impl fmt::Display for PieceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PieceSize::Small => "small",
            PieceSize::Medium => "medium",
            PieceSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// The two players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Stable index for per-player storage.
    pub fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Player::One => "player1",
            Player::Two => "player2",
        };
        write!(f, "{}", name)
    }
}

/// Unique token identifying one physical piece, allocated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceId(pub u32);

/// A game piece. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub size: PieceSize,
    pub owner: Player,
}

/// Where a selected piece comes from: the player's hand or a board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Hand,
    Board { x: u8, y: u8 },
}

/// A player's unplaced piece inventory, counted per size.
///
/// Counts only ever decrease: pieces taken from hand never return, and
/// removal at zero is refused so a count can never go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    small: u8,
    medium: u8,
    large: u8,
}

impl Hand {
    pub fn full() -> Self {
        Self {
            small: PIECES_PER_SIZE,
            medium: PIECES_PER_SIZE,
            large: PIECES_PER_SIZE,
        }
    }

    pub fn remaining(&self, size: PieceSize) -> u8 {
        match size {
            PieceSize::Small => self.small,
            PieceSize::Medium => self.medium,
            PieceSize::Large => self.large,
        }
    }

    /// Removes one piece of the given size. Returns false (and leaves the
    /// hand untouched) if none of that size remain.
    pub fn remove(&mut self, size: PieceSize) -> bool {
        let slot = match size {
            PieceSize::Small => &mut self.small,
            PieceSize::Medium => &mut self.medium,
            PieceSize::Large => &mut self.large,
        };
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    pub fn total(&self) -> u8 {
        self.small + self.medium + self.large
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Default for Hand {
    fn default() -> Self {
        Self::full()
    }
}
