//! Error types for the Adelphon transport layer.

use thiserror::Error;

/// Errors that can occur while moving frames between agents.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Underlying socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection
    #[error("Connection closed by peer")]
    Closed,

    /// A frame exceeded the transport's hard cap or was not valid text
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// No connection registered under the given id
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),
}

impl EnvError {
    /// Creates an invalid-frame error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Returns true if the error means the peer went away.
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
