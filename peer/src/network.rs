//! Peer event loop coordinating transport events, commands, and heartbeats

use crate::reconciler;
use crate::session::{LogLevel, PeerSession, Role, HEARTBEAT_INTERVAL};
use crate::transport::{self, Link, TransportEvent};
use engine::game::GameEngine;
use engine::piece::{Origin, PieceSize, Player};
use log::{debug, error, info, warn};
use protocol::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Requests sent from a driver (CLI, UI, tests) to the peer loop
#[derive(Debug)]
pub enum PeerCommand {
    /// Host a game, listening on the given address.
    Host { bind: SocketAddr },
    /// Join a game hosted at the given address.
    Join { addr: SocketAddr },
    /// Pick a piece of this size from the acting player's hand.
    SelectHand { size: PieceSize },
    /// Pick up the acting player's visible piece at a cell.
    SelectBoard { x: u8, y: u8 },
    /// Place the current selection.
    Place { x: u8, y: u8 },
    /// Restart the game on both sides.
    Reset,
    /// Tear down the current session, keeping the loop alive.
    Disconnect,
    /// Stop the event loop.
    Shutdown,
}

/// Cloneable handle for driving a running peer loop
///
/// Commands are fire-and-forget; results land in the shared engine and
/// session state, which callers read directly.
#[derive(Clone)]
pub struct PeerHandle {
    commands_tx: mpsc::UnboundedSender<PeerCommand>,
    engine: Arc<RwLock<GameEngine>>,
    session: Arc<RwLock<PeerSession>>,
}

impl PeerHandle {
    /// Queues a command. Returns false once the loop has shut down.
    pub fn send(&self, command: PeerCommand) -> bool {
        self.commands_tx.send(command).is_ok()
    }

    pub fn engine(&self) -> Arc<RwLock<GameEngine>> {
        Arc::clone(&self.engine)
    }

    pub fn session(&self) -> Arc<RwLock<PeerSession>> {
        Arc::clone(&self.session)
    }
}

/// Owns the game engine, the session, and the link to the remote player
///
/// Everything funnels through one `select!` loop: driver commands, transport
/// events, and the heartbeat timer. The loop is the only writer of the link,
/// so outbound frames keep the order their triggering events had.
pub struct Peer {
    engine: Arc<RwLock<GameEngine>>,
    session: Arc<RwLock<PeerSession>>,
    link: Option<Link>,

    // Transport tasks report into events_tx; a teardown swaps the pair so
    // events of an abandoned link can never reach the loop again
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    commands_rx: mpsc::UnboundedReceiver<PeerCommand>,
}

impl Peer {
    pub fn new() -> (Self, PeerHandle) {
        let engine = Arc::new(RwLock::new(GameEngine::new()));
        let session = Arc::new(RwLock::new(PeerSession::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let handle = PeerHandle {
            commands_tx,
            engine: Arc::clone(&engine),
            session: Arc::clone(&session),
        };
        let peer = Peer {
            engine,
            session,
            link: None,
            events_tx,
            events_rx,
            commands_rx,
        };
        (peer, handle)
    }

    /// Spawns the loop onto the runtime and returns its handle.
    pub fn spawn() -> PeerHandle {
        let (mut peer, handle) = Peer::new();
        tokio::spawn(async move { peer.run().await });
        handle
    }

    /// Main loop coordinating all peer operations
    pub async fn run(&mut self) {
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        info!("Peer loop started");

        loop {
            tokio::select! {
                command = self.commands_rx.recv() => {
                    match command {
                        Some(PeerCommand::Shutdown) | None => {
                            info!("Peer loop stopping");
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                },

                event = self.events_rx.recv() => {
                    // Never None: the loop holds a sender for this channel
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                },

                _ = heartbeat.tick() => {
                    self.heartbeat_tick().await;
                },
            }
        }
    }

    async fn handle_command(&mut self, command: PeerCommand) {
        match command {
            PeerCommand::Host { bind } => self.start_host(bind).await,
            PeerCommand::Join { addr } => self.start_join(addr).await,
            PeerCommand::SelectHand { size } => self.select_from_hand(size).await,
            PeerCommand::SelectBoard { x, y } => self.select_from_board(x, y).await,
            PeerCommand::Place { x, y } => self.place(x, y).await,
            PeerCommand::Reset => self.reset().await,
            PeerCommand::Disconnect => self.disconnect().await,
            // Handled by the run loop before dispatch
            PeerCommand::Shutdown => {}
        }
    }

    async fn start_host(&mut self, bind: SocketAddr) {
        let accepted = {
            let mut session = self.session.write().await;
            session.begin_init(Role::Host)
        };
        if !accepted {
            return;
        }
        self.fresh_game().await;
        self.replace_event_channel();

        match transport::listen(bind, self.events_tx.clone()).await {
            Ok(local) => {
                let mut session = self.session.write().await;
                session.listener_ready(local);
            }
            Err(e) => {
                error!("Failed to listen on {}: {}", bind, e);
                let mut session = self.session.write().await;
                session.transport_error(format!("listen on {} failed: {}", bind, e));
            }
        }
    }

    async fn start_join(&mut self, addr: SocketAddr) {
        let accepted = {
            let mut session = self.session.write().await;
            session.begin_init(Role::Guest) && session.begin_connect(addr)
        };
        if !accepted {
            return;
        }
        self.fresh_game().await;
        self.replace_event_channel();
        self.link = Some(transport::connect(addr, self.events_tx.clone()));
    }

    /// Replaces the engine for a new session. The host's roll decides the
    /// first player; the guest's copy is overwritten by the handshake.
    async fn fresh_game(&mut self) {
        let mut engine = self.engine.write().await;
        *engine = GameEngine::new();
    }

    /// Swaps in a fresh transport event channel, orphaning any tasks that
    /// still hold the old sender.
    fn replace_event_channel(&mut self) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;
    }

    /// Which player local commands act for: the session role when one is
    /// active, otherwise whoever's turn it is (local two-player game).
    async fn acting_player(&self) -> Player {
        let local = {
            let session = self.session.read().await;
            session.local_player()
        };
        match local {
            Some(player) => player,
            None => {
                let engine = self.engine.read().await;
                engine.current_player()
            }
        }
    }

    async fn select_from_hand(&mut self, size: PieceSize) {
        let player = self.acting_player().await;
        let piece = {
            let mut engine = self.engine.write().await;
            if engine.hand(player).remaining(size) == 0 {
                warn!("No {} piece left in {}'s hand", size, player);
                return;
            }
            let piece = engine.create_piece(size, player);
            engine.select_piece(Some(piece), Origin::Hand);
            piece
        };
        self.send_message(Message::Select {
            piece: Some(piece),
            origin: Some(Origin::Hand),
        })
        .await;
    }

    async fn select_from_board(&mut self, x: u8, y: u8) {
        let player = self.acting_player().await;
        let piece = {
            let engine = self.engine.read().await;
            match engine.top_piece(x, y) {
                Some(piece) if piece.owner == player => *piece,
                Some(_) => {
                    warn!("Top piece at ({}, {}) belongs to the opponent", x, y);
                    return;
                }
                None => {
                    warn!("No piece to pick up at ({}, {})", x, y);
                    return;
                }
            }
        };
        {
            let mut engine = self.engine.write().await;
            engine.select_piece(Some(piece), Origin::Board { x, y });
        }
        self.send_message(Message::Select {
            piece: Some(piece),
            origin: Some(Origin::Board { x, y }),
        })
        .await;
    }

    async fn place(&mut self, x: u8, y: u8) {
        let record = {
            let mut engine = self.engine.write().await;
            match engine.place_piece(x, y) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Placement at ({}, {}) refused: {}", x, y, e);
                    return;
                }
            }
        };
        self.send_message(Message::Move {
            x: record.x,
            y: record.y,
            piece: Some(record.piece),
            origin: Some(record.from),
        })
        .await;
    }

    async fn reset(&mut self) {
        {
            let mut engine = self.engine.write().await;
            engine.reset();
        }
        self.send_message(Message::Reset).await;

        // After any reset the host's fresh roll decides who starts
        let is_host = {
            let session = self.session.read().await;
            session.role() == Some(Role::Host)
        };
        if is_host {
            let current_player = {
                let engine = self.engine.read().await;
                engine.current_player()
            };
            self.send_message(Message::GameState { current_player }).await;
        }
    }

    async fn disconnect(&mut self) {
        self.link = None;
        self.replace_event_channel();
        let mut session = self.session.write().await;
        session.force_disconnect();
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Incoming { peer, link } => {
                let accepted = {
                    let mut session = self.session.write().await;
                    session.incoming(peer)
                };
                if accepted {
                    self.link = Some(link);
                } else {
                    // Dropping the link hangs up on the uninvited peer
                    warn!("Refusing connection from {}", peer);
                }
            }

            TransportEvent::Opened { peer } => {
                let (opened, role) = {
                    let mut session = self.session.write().await;
                    (session.opened(), session.role())
                };
                if opened && role == Some(Role::Guest) {
                    debug!("Link to {} open, announcing ready", peer);
                    self.send_message(Message::Ready).await;
                }
            }

            TransportEvent::Data { bytes } => self.handle_frame(&bytes).await,

            TransportEvent::Closed => {
                let closed = {
                    let mut session = self.session.write().await;
                    session.closed()
                };
                if closed {
                    self.link = None;
                }
            }

            TransportEvent::Error { message } => {
                error!("Transport failure: {}", message);
                self.link = None;
                let mut session = self.session.write().await;
                session.transport_error(message);
            }
        }
    }

    async fn handle_frame(&mut self, bytes: &[u8]) {
        let inbound = match protocol::decode(bytes) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Dropping bad frame from peer: {}", e);
                let mut session = self.session.write().await;
                session
                    .log_mut()
                    .push(LogLevel::Error, format!("bad frame: {}", e));
                return;
            }
        };
        debug!(
            "Received {} (sent {} ms ago)",
            inbound.message.kind(),
            inbound.delay_ms
        );

        let replies = {
            let mut engine = self.engine.write().await;
            let mut session = self.session.write().await;
            reconciler::apply_inbound(&mut engine, &mut session, inbound)
        };
        for reply in replies {
            self.send_message(reply).await;
        }
    }

    async fn send_message(&self, message: Message) {
        if let Some(link) = &self.link {
            match protocol::encode(&message) {
                Ok(bytes) => {
                    if !link.send(bytes) {
                        warn!("Link writer gone, dropping {}", message.kind());
                    }
                }
                Err(e) => error!("Failed to encode {}: {}", message.kind(), e),
            }
        } else {
            debug!("No link, not sending {}", message.kind());
        }
    }

    async fn heartbeat_tick(&mut self) {
        let connected = {
            let session = self.session.read().await;
            session.is_connected()
        };
        if !connected {
            return;
        }
        self.send_message(Message::Heartbeat {
            id: protocol::get_timestamp(),
        })
        .await;
        let mut session = self.session.write().await;
        session.liveness_check();
    }
}
