use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Process-unique identity of a client connection.
///
/// The router refers to connections only through this id; the connection
/// object itself is owned by the bridge's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection. Frames are only processed while `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Active,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Lock-free cell holding a [`ConnectionState`]. Transitions only move
/// forward; an attempt to go back is ignored.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        StateCell(AtomicU8::new(ConnectionState::Connecting as u8))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advances to `next`. Returns `true` if the state changed.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let next = next as u8;
        self.0.fetch_max(next, Ordering::AcqRel) < next
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a connection left the `Active` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its end of the transport.
    PeerClosed,
    /// Malformed frame; carries the rendered protocol error.
    Protocol(String),
    /// Outbound queue overflowed under the disconnect policy.
    SlowSubscriber,
    IdleTimeout,
    /// Transport failure; carries the rendered I/O error.
    Transport(String),
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::Protocol(e) => write!(f, "protocol error: {e}"),
            CloseReason::SlowSubscriber => write!(f, "outbound queue overflow"),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
            CloseReason::Shutdown => write!(f, "bus shutting down"),
        }
    }
}
