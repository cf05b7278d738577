//! Common types for the Adelphon transport layer.

use crate::link::Link;

/// Identifies one registered connection inside a [`Multiplexer`](crate::Multiplexer).
///
/// Ids are handed out sequentially and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// A readiness event produced by the multiplexer.
pub enum NetEvent {
    /// A complete frame arrived on a registered connection.
    Frame(ConnId, String),

    /// The connection was closed (cleanly or by an I/O error).
    Closed(ConnId),

    /// An acceptor produced a new, not yet registered connection.
    Incoming(Link),
}

impl std::fmt::Debug for NetEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetEvent::Frame(id, frame) => write!(f, "Frame({id}, {frame:?})"),
            NetEvent::Closed(id) => write!(f, "Closed({id})"),
            NetEvent::Incoming(link) => write!(f, "Incoming({})", link.label()),
        }
    }
}
