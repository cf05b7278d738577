//! Point-to-point frame links between Adelphon agents.

use async_trait::async_trait;
use crate::error::EnvError;

/// Receiving half of a connection.
///
/// Frames are whole protocol messages (one line of ASCII text on the wire).
///
/// # Returns
/// * `Ok(Some(frame))` - A frame was received
/// * `Ok(None)` - The peer closed the connection cleanly
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Waits for the next complete frame.
    async fn read_frame(&mut self) -> Result<Option<String>, EnvError>;
}

/// Sending half of a connection.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Writes one complete frame.
    ///
    /// Frames must not contain a newline; the transport owns framing.
    async fn write_frame(&mut self, frame: &str) -> Result<(), EnvError>;
}

/// Source of freshly opened inbound links (a listening socket).
#[async_trait]
pub trait Acceptor: Send + 'static {
    /// Waits for the next inbound connection.
    async fn accept(&mut self) -> Result<Link, EnvError>;
}

/// A bidirectional connection to one peer.
///
/// Runners use links directly (send, then block on the reply). Relayers hand
/// their links to a [`Multiplexer`](crate::Multiplexer), which splits them.
pub struct Link {
    label: String,
    reader: Box<dyn FrameReader>,
    writer: Box<dyn FrameWriter>,
}

impl Link {
    /// Creates a link from its two halves.
    pub fn new(
        label: impl Into<String>,
        reader: Box<dyn FrameReader>,
        writer: Box<dyn FrameWriter>,
    ) -> Self {
        Self {
            label: label.into(),
            reader,
            writer,
        }
    }

    /// Human-readable peer description (for logging).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sends one frame.
    pub async fn send(&mut self, frame: &str) -> Result<(), EnvError> {
        self.writer.write_frame(frame).await
    }

    /// Receives one frame. A closed connection is an error here: callers that
    /// block on a reply have no use for an orderly EOF.
    pub async fn recv(&mut self) -> Result<String, EnvError> {
        self.reader.read_frame().await?.ok_or(EnvError::Closed)
    }

    /// Sends a frame and blocks for exactly one reply.
    pub async fn request(&mut self, frame: &str) -> Result<String, EnvError> {
        self.send(frame).await?;
        self.recv().await
    }

    /// Splits the link into label, reader and writer.
    pub fn into_parts(self) -> (String, Box<dyn FrameReader>, Box<dyn FrameWriter>) {
        (self.label, self.reader, self.writer)
    }
}
