//! Connection session management for a peer-to-peer game link
//!
//! This module tracks everything about the link to the remote player that is
//! not the link itself, including:
//! - The session lifecycle (initializing, waiting, connecting, connected)
//! - The local role (host or guest) and which player it controls
//! - Heartbeat bookkeeping and silence detection
//! - A capped, newest-first log of connection events for display
//!
//! The session is plain synchronous state. Transport tasks and the command
//! loop report events into it and read decisions out of it, which keeps every
//! lifecycle rule unit-testable without opening a socket.

use engine::piece::Player;
use log::{info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How often a connected peer sends a heartbeat probe.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Silence longer than this marks the remote peer as possibly gone.
/// The session only warns; it never tears the link down on its own.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retained connection log entries.
pub const CONNECTION_LOG_CAP: usize = 20;

/// Lifecycle of the link to the remote player
///
/// `Waiting` only occurs on the host side (listener up, nobody dialed in
/// yet). `Connecting` covers both directions: a guest mid-dial and a host
/// whose listener accepted a connection that is not confirmed open yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Initializing,
    Waiting,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Initializing => "initializing",
            ConnectionStatus::Waiting => "waiting",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Which side of the session this process is
///
/// The role decides piece ownership: the host always controls player one and
/// the guest player two, so both sides agree without negotiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// The player this side of the session controls.
    pub fn player(&self) -> Player {
        match self {
            Role::Host => Player::One,
            Role::Guest => Player::Two,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

/// Severity of a connection log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

/// One timestamped connection event kept for display
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Epoch milliseconds when the event was recorded
    pub at: u64,
    pub level: LogLevel,
    pub text: String,
}

/// Capped, newest-first log of connection events
///
/// The most recent entry is always at index zero. Once the cap is reached
/// the oldest entries fall off the back, so the log never grows past
/// [`CONNECTION_LOG_CAP`] entries no matter how long a session runs.
#[derive(Debug, Default)]
pub struct ConnectionLog {
    entries: VecDeque<LogEntry>,
}

impl ConnectionLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Records an event, evicting the oldest entry past the cap.
    pub fn push(&mut self, level: LogLevel, text: impl Into<String>) {
        self.entries.push_front(LogEntry {
            at: protocol::get_timestamp(),
            level,
            text: text.into(),
        });
        self.entries.truncate(CONNECTION_LOG_CAP);
    }

    /// Drops all entries. The session keeps logging into the emptied buffer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries newest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tracks the full lifecycle of the link to the remote player
///
/// All transition methods validate the current state and return whether the
/// transition was accepted. Rejected transitions leave the session untouched;
/// this is what protects the session from events of an abandoned transport
/// task arriving after a disconnect.
#[derive(Debug)]
pub struct PeerSession {
    status: ConnectionStatus,
    role: Option<Role>,
    /// Address the host listener is bound to
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    /// Last time anything arrived from the remote peer
    last_heartbeat: Option<Instant>,
    /// Set once the current silent stretch has been warned about
    warned_silent: bool,
    log: ConnectionLog,
    last_error: Option<String>,
}

impl PeerSession {
    /// Creates a disconnected session with no role.
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            role: None,
            local_addr: None,
            peer_addr: None,
            last_heartbeat: None,
            warned_silent: false,
            log: ConnectionLog::new(),
            last_error: None,
        }
    }

    /// Starts a new session in the given role
    ///
    /// Only legal from `Disconnected` or `Error`; an established or pending
    /// session has to be torn down before the role can change.
    pub fn begin_init(&mut self, role: Role) -> bool {
        match self.status {
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                self.status = ConnectionStatus::Initializing;
                self.role = Some(role);
                self.last_error = None;
                self.log
                    .push(LogLevel::Info, format!("initializing as {}", role));
                true
            }
            _ => {
                warn!("Ignoring init request while {}", self.status);
                false
            }
        }
    }

    /// Host's listener is up and waiting for an opponent to dial in.
    pub fn listener_ready(&mut self, addr: SocketAddr) -> bool {
        if self.role == Some(Role::Host) && self.status == ConnectionStatus::Initializing {
            self.status = ConnectionStatus::Waiting;
            self.local_addr = Some(addr);
            self.log.push(
                LogLevel::Info,
                format!("listening on {}, waiting for an opponent", addr),
            );
            true
        } else {
            warn!("Ignoring listener_ready while {}", self.status);
            false
        }
    }

    /// Guest started dialing the host.
    pub fn begin_connect(&mut self, addr: SocketAddr) -> bool {
        if self.role == Some(Role::Guest) && self.status == ConnectionStatus::Initializing {
            self.status = ConnectionStatus::Connecting;
            self.peer_addr = Some(addr);
            self.log
                .push(LogLevel::Info, format!("connecting to {}", addr));
            true
        } else {
            warn!("Ignoring connect request while {}", self.status);
            false
        }
    }

    /// Host's listener accepted a connection that is not confirmed open yet.
    pub fn incoming(&mut self, addr: SocketAddr) -> bool {
        if self.role == Some(Role::Host) && self.status == ConnectionStatus::Waiting {
            self.status = ConnectionStatus::Connecting;
            self.peer_addr = Some(addr);
            self.log
                .push(LogLevel::Info, format!("incoming connection from {}", addr));
            true
        } else {
            warn!("Ignoring incoming connection while {}", self.status);
            false
        }
    }

    /// The link is confirmed open in both directions
    ///
    /// Starts heartbeat tracking. Refused outside `Connecting`, which drops
    /// stale open notifications from a transport task that outlived its
    /// session.
    pub fn opened(&mut self) -> bool {
        if self.status == ConnectionStatus::Connecting {
            self.status = ConnectionStatus::Connected;
            self.last_heartbeat = Some(Instant::now());
            self.warned_silent = false;
            self.log.push(LogLevel::Success, "connection established");
            info!("Connected to peer {:?}", self.peer_addr);
            true
        } else {
            warn!("Ignoring open notification while {}", self.status);
            false
        }
    }

    /// The remote peer closed the link or the link dropped.
    pub fn closed(&mut self) -> bool {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                self.status = ConnectionStatus::Disconnected;
                self.peer_addr = None;
                self.last_heartbeat = None;
                self.log.push(LogLevel::Info, "connection closed by peer");
                info!("Peer connection closed");
                true
            }
            _ => false,
        }
    }

    /// A transport failure took the session down.
    pub fn transport_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = ConnectionStatus::Error;
        self.last_heartbeat = None;
        self.log.push(LogLevel::Error, message.clone());
        self.last_error = Some(message);
    }

    /// Local teardown: back to a blank disconnected session
    ///
    /// The role is cleared so the next init can pick either side. Events
    /// from tasks belonging to the old link are rejected from here on.
    pub fn force_disconnect(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.role = None;
        self.local_addr = None;
        self.peer_addr = None;
        self.last_heartbeat = None;
        self.warned_silent = false;
        self.last_error = None;
        self.log.push(LogLevel::Info, "disconnected");
        info!("Session disconnected");
    }

    /// Notes that something arrived from the remote peer
    ///
    /// Every inbound message counts as liveness, not just heartbeats. Also
    /// clears any standing silence warning.
    pub fn note_heartbeat(&mut self) {
        if self.status == ConnectionStatus::Connected {
            self.last_heartbeat = Some(Instant::now());
            self.warned_silent = false;
        }
    }

    /// How long the remote peer has been silent, if a link is up.
    pub fn silent_for(&self) -> Option<Duration> {
        self.last_heartbeat.map(|at| at.elapsed())
    }

    /// Checks whether the remote peer has gone silent past the timeout
    ///
    /// Returns true when this call recorded a new warning. Each silent
    /// stretch is warned about once; the flag resets when the peer is heard
    /// from again. The session deliberately never disconnects on silence,
    /// since the peer may recover and the link error path covers real loss.
    pub fn liveness_check(&mut self) -> bool {
        if self.status != ConnectionStatus::Connected || self.warned_silent {
            return false;
        }
        match self.silent_for() {
            Some(silence) if silence > LIVENESS_TIMEOUT => {
                self.warned_silent = true;
                self.log.push(
                    LogLevel::Error,
                    format!("no heartbeat for {}s, peer may be gone", silence.as_secs()),
                );
                warn!("Peer silent for {}s", silence.as_secs());
                true
            }
            _ => false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// The player controlled by this side, once a role is chosen.
    pub fn local_player(&self) -> Option<Player> {
        self.role.map(|role| role.player())
    }

    /// Bound listener address, once hosting.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn log(&self) -> &ConnectionLog {
        &self.log
    }

    /// Mutable log access for collaborators that record their own events.
    pub fn log_mut(&mut self) -> &mut ConnectionLog {
        &mut self.log
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl Default for PeerSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Tests cover the full session lifecycle for both roles, rejection of
/// out-of-order transitions, heartbeat silence detection, and the capped
/// connection log.
#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_fresh_session() {
        let session = PeerSession::new();
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert_eq!(session.role(), None);
        assert_eq!(session.local_player(), None);
        assert_eq!(session.peer_addr(), None);
        assert!(!session.is_connected());
        assert!(session.log().is_empty());
    }

    #[test]
    fn test_host_lifecycle() {
        let mut session = PeerSession::new();

        assert!(session.begin_init(Role::Host));
        assert_eq!(session.status(), ConnectionStatus::Initializing);

        assert!(session.listener_ready(test_addr()));
        assert_eq!(session.status(), ConnectionStatus::Waiting);
        assert_eq!(session.local_addr(), Some(test_addr()));

        assert!(session.incoming(test_addr()));
        assert_eq!(session.status(), ConnectionStatus::Connecting);

        assert!(session.opened());
        assert!(session.is_connected());
        assert_eq!(session.local_player(), Some(Player::One));
        assert_eq!(session.peer_addr(), Some(test_addr()));
    }

    #[test]
    fn test_guest_lifecycle() {
        let mut session = PeerSession::new();

        assert!(session.begin_init(Role::Guest));
        assert!(session.begin_connect(test_addr()));
        assert_eq!(session.status(), ConnectionStatus::Connecting);

        assert!(session.opened());
        assert!(session.is_connected());
        assert_eq!(session.local_player(), Some(Player::Two));
    }

    #[test]
    fn test_guest_cannot_use_host_transitions() {
        let mut session = PeerSession::new();
        session.begin_init(Role::Guest);

        assert!(!session.listener_ready(test_addr()));
        assert!(!session.incoming(test_addr()));
        assert_eq!(session.status(), ConnectionStatus::Initializing);
    }

    #[test]
    fn test_init_rejected_while_active() {
        let mut session = PeerSession::new();
        session.begin_init(Role::Host);
        assert!(!session.begin_init(Role::Guest));
        assert_eq!(session.role(), Some(Role::Host));

        session.listener_ready(test_addr());
        session.incoming(test_addr());
        session.opened();
        assert!(!session.begin_init(Role::Guest));
        assert!(session.is_connected());
    }

    #[test]
    fn test_stale_open_rejected_after_disconnect() {
        let mut session = PeerSession::new();
        session.begin_init(Role::Guest);
        session.begin_connect(test_addr());
        session.force_disconnect();

        // A task from the torn-down link reports its open too late
        assert!(!session.opened());
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert_eq!(session.role(), None);
    }

    #[test]
    fn test_closed_by_peer() {
        let mut session = PeerSession::new();
        session.begin_init(Role::Guest);
        session.begin_connect(test_addr());
        session.opened();
        assert_eq!(session.peer_addr(), Some(test_addr()));

        assert!(session.closed());
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        // The remote identity must not outlive the link
        assert_eq!(session.peer_addr(), None);
        assert!(!session.closed());
    }

    #[test]
    fn test_error_then_retry() {
        let mut session = PeerSession::new();
        session.begin_init(Role::Guest);
        session.begin_connect(test_addr());
        session.transport_error("connection refused");

        assert_eq!(session.status(), ConnectionStatus::Error);
        assert_eq!(session.last_error(), Some("connection refused"));

        // A fresh init is allowed straight from the error state
        assert!(session.begin_init(Role::Guest));
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_heartbeat_refreshes_silence() {
        let mut session = PeerSession::new();
        session.begin_init(Role::Guest);
        session.begin_connect(test_addr());
        session.opened();

        session.last_heartbeat = Some(Instant::now() - Duration::from_secs(20));
        assert!(session.silent_for().unwrap() >= Duration::from_secs(20));

        session.note_heartbeat();
        assert!(session.silent_for().unwrap() < Duration::from_secs(1));
    }

    #[test]
    fn test_liveness_warning_fires_once_per_silence() {
        let mut session = PeerSession::new();
        session.begin_init(Role::Host);
        session.listener_ready(test_addr());
        session.incoming(test_addr());
        session.opened();

        // Under the timeout: no warning
        session.last_heartbeat = Some(Instant::now() - Duration::from_secs(29));
        assert!(!session.liveness_check());

        // Past the timeout: warn exactly once
        session.last_heartbeat = Some(Instant::now() - Duration::from_secs(31));
        assert!(session.liveness_check());
        assert!(!session.liveness_check());
        assert!(session.is_connected());

        let newest = session.log().entries().next().unwrap();
        assert_eq!(newest.level, LogLevel::Error);
        assert!(newest.text.contains("no heartbeat"));

        // Hearing from the peer re-arms the warning
        session.note_heartbeat();
        session.last_heartbeat = Some(Instant::now() - Duration::from_secs(31));
        assert!(session.liveness_check());
    }

    #[test]
    fn test_liveness_ignored_when_not_connected() {
        let mut session = PeerSession::new();
        assert!(!session.liveness_check());
        session.begin_init(Role::Guest);
        session.begin_connect(test_addr());
        assert!(!session.liveness_check());
    }

    #[test]
    fn test_connection_log_caps_newest_first() {
        let mut log = ConnectionLog::new();
        for i in 0..25 {
            log.push(LogLevel::Info, format!("event {}", i));
        }

        assert_eq!(log.len(), CONNECTION_LOG_CAP);
        let texts: Vec<&str> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts[0], "event 24");
        assert_eq!(texts[CONNECTION_LOG_CAP - 1], "event 5");

        log.clear();
        assert!(log.is_empty());
        log.push(LogLevel::Info, "after clear");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_role_player_assignment() {
        assert_eq!(Role::Host.player(), Player::One);
        assert_eq!(Role::Guest.player(), Player::Two);
        assert_eq!(Role::Host.to_string(), "host");
        assert_eq!(Role::Guest.to_string(), "guest");
    }

    #[test]
    fn test_status_display_names() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionStatus::Waiting.to_string(), "waiting");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
    }
}
