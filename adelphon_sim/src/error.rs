//! Error types for Adelphon agent processes.

use adelphon_core::{CodecError, ConfigError, CoordinatorError, MeshError, NavError};
use adelphon_env::EnvError;
use thiserror::Error;

/// Errors that stop an agent process.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Transport failure
    #[error("Transport error: {0}")]
    Env(#[from] EnvError),

    /// Malformed frame from a peer
    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("Navigation error: {0}")]
    Nav(#[from] NavError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A peer went away while the game was still in progress
    #[error("Connection to {0} lost while the game is in progress")]
    ConnectionLost(String),

    /// A handshake or reply that makes no sense for the connection
    #[error("Unexpected frame from {peer}: {frame:?}")]
    UnexpectedFrame { peer: String, frame: String },

    /// Config files, exports, child processes
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A spawned agent task panicked or was cancelled
    #[error("Agent task failed: {0}")]
    Task(String),
}

impl NodeError {
    pub fn lost(peer: impl std::fmt::Display) -> Self {
        Self::ConnectionLost(peer.to_string())
    }

    pub fn unexpected(peer: impl std::fmt::Display, frame: impl Into<String>) -> Self {
        Self::UnexpectedFrame {
            peer: peer.to_string(),
            frame: frame.into(),
        }
    }
}
