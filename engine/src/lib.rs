//! # Gobblet Gobblers Rules Engine
//!
//! This library implements the complete rules of gobblet gobblers: a 3x3
//! tic-tac-toe variant where pieces come in three sizes and a larger piece
//! may be placed on top of a smaller one, hiding it until the larger piece
//! moves away. All state transitions are synchronous and deterministic,
//! which makes the engine equally usable from a local UI loop and from a
//! networked peer that replays remote moves.
//!
//! ## Rules Summary
//!
//! Each player starts with two pieces of each size in hand. On their turn a
//! player either places a piece from hand or lifts one of their visible
//! pieces off the board, then drops it on any cell whose visible piece is
//! strictly smaller (or which is empty). Three visible pieces of the same
//! owner in a row, column, or diagonal win. Lifting a piece can expose an
//! opponent line that was covered, so a move can lose the game for the
//! player who made it.
//!
//! ## Module Organization
//!
//! ### Piece Module (`piece`)
//! The vocabulary types shared by everything else:
//! - Piece sizes with a total order used for the covering rule
//! - Player identities and turn alternation
//! - Hand inventories with per-size counts
//! - Move origins (from hand or from a board cell)
//!
//! ### Board Module (`board`)
//! The 3x3 grid of stacking cells:
//! - Per-cell piece stacks where only the top piece is visible
//! - The covering rule (strictly smaller pieces only)
//! - The fixed scan order of all eight winnable lines
//!
//! ### Game Module (`game`)
//! The engine proper, tying the above together:
//! - Selection tracking (pick up, then place as two separate steps)
//! - Placement validation with typed refusal reasons
//! - Win and draw detection after every move
//! - Append-only move history and full-state reset
//!
//! ## Usage Example
//!
//! ```rust
//! use engine::game::GameEngine;
//! use engine::piece::{Origin, PieceSize, Player};
//!
//! let mut game = GameEngine::with_first_player(Player::One);
//!
//! // Pick a large piece from hand and drop it on the center cell
//! let piece = game.create_piece(PieceSize::Large, Player::One);
//! game.select_piece(Some(piece), Origin::Hand);
//! game.place_piece(1, 1).unwrap();
//!
//! assert_eq!(game.current_player(), Player::Two);
//! assert!(game.top_piece(1, 1).is_some());
//! ```
//!
//! ## Design Philosophy
//!
//! ### Visible State Decides Everything
//! Covered pieces do not exist as far as the rules are concerned: ownership
//! of a cell, the covering rule, and win detection all consult only the top
//! of each stack. The stacks themselves are kept so that lifting a piece
//! restores whatever it was hiding.
//!
//! ### Failures Leave No Trace
//! An invalid placement returns a typed error and changes nothing. Callers
//! can therefore try a placement speculatively and fall back to a different
//! one without repairing state.
//!
//! ### No Network Awareness
//! The engine never serializes itself and never talks to a socket. Remote
//! play is built on top by replaying the same placement calls on both sides,
//! which keeps the two concerns testable in isolation.

pub mod board;
pub mod game;
pub mod piece;
