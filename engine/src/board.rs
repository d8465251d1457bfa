use crate::piece::Piece;
use serde::{Deserialize, Serialize};

/// Board edge length; the grid is always 3×3.
pub const BOARD_SIZE: u8 = 3;

/// Every line that can win, in the canonical scan order: rows top to
/// bottom, then columns left to right, then the two diagonals. The first
/// completed line in this order decides the winner.
pub const LINES: [[(u8, u8); 3]; 8] = [
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// One grid cell holding a stack of pieces, bottom to top. Only the top
/// piece is visible or interactable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub x: u8,
    pub y: u8,
    stack: Vec<Piece>,
}

impl Cell {
    fn new(x: u8, y: u8) -> Self {
        Self {
            x,
            y,
            stack: Vec::new(),
        }
    }

    /// The visible piece, if any.
    pub fn top(&self) -> Option<&Piece> {
        self.stack.last()
    }

    pub fn stack(&self) -> &[Piece] {
        &self.stack
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Whether `piece` may legally be placed here: the stack is empty or
    /// its top piece is strictly smaller.
    pub fn can_accept(&self, piece: &Piece) -> bool {
        match self.top() {
            Some(top) => top.size < piece.size,
            None => true,
        }
    }

    pub(crate) fn push(&mut self, piece: Piece) {
        self.stack.push(piece);
    }

    pub(crate) fn pop(&mut self) -> Option<Piece> {
        self.stack.pop()
    }
}

/// The fixed 3×3 grid, indexed by `(x, y)` with both in `0..3`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    cells: [[Cell; 3]; 3],
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: std::array::from_fn(|y| std::array::from_fn(|x| Cell::new(x as u8, y as u8))),
        }
    }

    pub fn in_bounds(x: u8, y: u8) -> bool {
        x < BOARD_SIZE && y < BOARD_SIZE
    }

    pub fn cell(&self, x: u8, y: u8) -> Option<&Cell> {
        if Self::in_bounds(x, y) {
            Some(&self.cells[y as usize][x as usize])
        } else {
            None
        }
    }

    pub(crate) fn cell_mut(&mut self, x: u8, y: u8) -> Option<&mut Cell> {
        if Self::in_bounds(x, y) {
            Some(&mut self.cells[y as usize][x as usize])
        } else {
            None
        }
    }

    /// True when every cell has at least one piece on it.
    pub fn is_full(&self) -> bool {
        self.cells
            .iter()
            .flatten()
            .all(|cell| cell.top().is_some())
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flatten()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
