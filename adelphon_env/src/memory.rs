//! In-memory links for running a whole game inside one process.
//!
//! Used by the simulation harness and by tests: every TCP connection of a
//! real deployment becomes one [`pair`].

use async_trait::async_trait;
use crate::error::EnvError;
use crate::link::{FrameReader, FrameWriter, Link};
use tokio::sync::mpsc;

struct ChannelReader {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameReader for ChannelReader {
    async fn read_frame(&mut self) -> Result<Option<String>, EnvError> {
        Ok(self.rx.recv().await)
    }
}

struct ChannelWriter {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn write_frame(&mut self, frame: &str) -> Result<(), EnvError> {
        if frame.contains('\n') {
            return Err(EnvError::invalid("frame contains a newline"));
        }
        self.tx.send(frame.to_string()).map_err(|_| EnvError::Closed)
    }
}

/// Creates two connected links. Frames written on one side are read on the
/// other; dropping a side closes the connection for its peer.
///
/// Labels describe the *peer* each side talks to.
pub fn pair(left_peer: &str, right_peer: &str) -> (Link, Link) {
    let (left_tx, right_rx) = mpsc::unbounded_channel();
    let (right_tx, left_rx) = mpsc::unbounded_channel();

    let left = Link::new(
        left_peer,
        Box::new(ChannelReader { rx: left_rx }),
        Box::new(ChannelWriter { tx: left_tx }),
    );
    let right = Link::new(
        right_peer,
        Box::new(ChannelReader { rx: right_rx }),
        Box::new(ChannelWriter { tx: right_tx }),
    );
    (left, right)
}
