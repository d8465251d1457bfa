//! Applies messages from the remote player to the local game state

use crate::session::{LogLevel, PeerSession, Role};
use engine::game::GameEngine;
use engine::piece::Origin;
use log::{debug, info, warn};
use protocol::{Inbound, Message};

/// Applies one inbound message, returning any replies to send back
///
/// Every arrival counts as liveness for the session, and arrivals that
/// spent too long in transit are noted in the connection log before being
/// applied normally. A move that the local engine refuses is logged and
/// dropped; the two boards have diverged at that point and the mismatch is
/// surfaced rather than papered over.
pub fn apply_inbound(
    engine: &mut GameEngine,
    session: &mut PeerSession,
    inbound: Inbound,
) -> Vec<Message> {
    session.note_heartbeat();

    if inbound.stale {
        warn!(
            "Received {} {} ms late",
            inbound.message.kind(),
            inbound.delay_ms
        );
        session.log_mut().push(
            LogLevel::Error,
            format!(
                "received {} {} ms late",
                inbound.message.kind(),
                inbound.delay_ms
            ),
        );
    }

    match inbound.message {
        Message::Move {
            x,
            y,
            piece,
            origin,
        } => {
            match piece {
                Some(piece) => {
                    engine.select_piece(Some(piece), origin.unwrap_or(Origin::Hand));
                    match engine.place_piece(x, y) {
                        Ok(record) => {
                            debug!(
                                "Applied remote move by {} to ({}, {})",
                                record.player, x, y
                            );
                        }
                        Err(e) => {
                            warn!("Remote move to ({}, {}) rejected: {}", x, y, e);
                            session
                                .log_mut()
                                .push(LogLevel::Error, format!("remote move rejected: {}", e));
                            // Do not leave the foreign selection behind
                            engine.select_piece(None, Origin::Hand);
                        }
                    }
                }
                None => warn!("Dropping remote move without piece data"),
            }
            Vec::new()
        }

        Message::Select { piece, origin } => {
            // Mirror of the opponent's in-progress selection, display only
            engine.select_piece(piece, origin.unwrap_or(Origin::Hand));
            Vec::new()
        }

        Message::Ready => {
            session.log_mut().push(LogLevel::Info, "opponent is ready");
            if session.role() == Some(Role::Host) {
                // The host's view of the turn order is authoritative
                info!("Opponent ready, sending opening state");
                vec![Message::GameState {
                    current_player: engine.current_player(),
                }]
            } else {
                warn!("Ignoring ready message on the guest side");
                Vec::new()
            }
        }

        Message::GameState { current_player } => {
            engine.set_current_player(current_player);
            session.log_mut().push(
                LogLevel::Success,
                format!("synchronized, {} moves first", current_player),
            );
            Vec::new()
        }

        Message::Heartbeat { id } => {
            debug!("Heartbeat {} from peer", id);
            Vec::new()
        }

        Message::Reset => {
            engine.reset();
            session
                .log_mut()
                .push(LogLevel::Info, "opponent restarted the game");
            if session.role() == Some(Role::Host) {
                // Both sides rolled a fresh first player; the host's roll wins
                vec![Message::GameState {
                    current_player: engine.current_player(),
                }]
            } else {
                Vec::new()
            }
        }
    }
}
