//! # Gobblet Gobblers Peer Library
//!
//! This library provides the complete networked-play implementation for
//! gobblet gobblers. Two instances connect directly to each other over TCP,
//! one hosting and one joining, and keep their local game engines in step by
//! exchanging every move as it happens.
//!
//! ## Architecture Overview
//!
//! ### Symmetric Peers
//! There is no standalone game server. Both processes run the same event
//! loop, the same engine, and the same message handling; the only
//! asymmetries are who listens and who dials, and that the host's view of
//! the turn order wins whenever the two sides have to agree.
//!
//! ### Full-Move Replication
//! Each side applies its own moves locally for instant feedback, then sends
//! the complete move (destination, piece, origin) to the other side, which
//! replays it through the identical rules engine. With a reliable ordered
//! link and both engines enforcing the same rules, the boards stay in step
//! without snapshots or rollback.
//!
//! ### Host-Authoritative Handshake
//! On connect the guest announces itself ready and the host answers with the
//! opening state (who moves first). The same exchange runs after every
//! restart, so a reset never leaves the two sides disagreeing about whose
//! turn it is.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Tracks the link lifecycle without touching sockets:
//! - Connection status transitions for host and guest roles
//! - Heartbeat bookkeeping and silence warnings
//! - The capped, newest-first connection event log
//!
//! ### Transport Module (`transport`)
//! Owns the sockets and nothing else:
//! - TCP listener and dialer tasks
//! - Length-prefixed framing in both directions
//! - Link events reported over a channel to the peer loop
//!
//! ### Reconciler Module (`reconciler`)
//! Applies decoded remote messages to the local engine and session, and
//! decides which replies (if any) go back.
//!
//! ### Network Module (`network`)
//! The peer loop tying everything together: one `select!` over driver
//! commands, transport events, and the heartbeat timer.
//!
//! ## Known Limits
//!
//! A move the local engine refuses to replay means the two boards have
//! diverged, which with an ordered reliable link only happens if one side is
//! buggy or hostile. The mismatch is logged and the move dropped; there is
//! no state-snapshot recovery. Restarting the game resynchronizes both
//! sides.

pub mod network;
pub mod reconciler;
pub mod session;
pub mod transport;
