//! Readiness multiplexer: many links, one inbox, one logical thread.
//!
//! Every registered link gets a small pump task that forwards complete frames
//! into a shared channel. The owner drains that channel with
//! [`Multiplexer::next_event`] and runs each handler to completion before
//! looking at the next event. On a current-thread runtime this is the classic
//! `select()` loop: cooperative, no handler preempts another.
//!
//! ```text
//!  link A ──pump──┐
//!  link B ──pump──┼──► inbox ──► next_event() ──► handler
//!  acceptor ──────┘
//! ```
//!
//! Pump and acceptor tasks live as long as the multiplexer; dropping it
//! aborts them and releases their sockets.

use crate::error::EnvError;
use crate::link::{Acceptor, FrameWriter, Link};
use crate::types::{ConnId, NetEvent};

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Table of live connections plus the shared readiness inbox.
pub struct Multiplexer {
    inbox_tx: mpsc::UnboundedSender<NetEvent>,
    inbox_rx: mpsc::UnboundedReceiver<NetEvent>,
    writers: HashMap<ConnId, Box<dyn FrameWriter>>,
    labels: HashMap<ConnId, String>,
    tasks: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl Multiplexer {
    /// Creates an empty multiplexer.
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            inbox_tx,
            inbox_rx,
            writers: HashMap::new(),
            labels: HashMap::new(),
            tasks: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a link and starts pumping its frames into the inbox.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&mut self, link: Link) -> ConnId {
        let id = ConnId(self.next_id);
        self.next_id += 1;

        let (label, mut reader, writer) = link.into_parts();
        debug!("Registered {} as {}", label, id);
        self.writers.insert(id, writer);
        self.labels.insert(id, label);

        let tx = self.inbox_tx.clone();
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(async move {
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        if tx.send(NetEvent::Frame(id, frame)).is_err() {
                            break; // multiplexer dropped
                        }
                    }
                    Ok(None) => {
                        let _ = tx.send(NetEvent::Closed(id));
                        break;
                    }
                    Err(e) => {
                        debug!("Read on {} failed: {}", id, e);
                        let _ = tx.send(NetEvent::Closed(id));
                        break;
                    }
                }
            }
        }));

        id
    }

    /// Forwards every inbound link from `acceptor` into the inbox as
    /// [`NetEvent::Incoming`]. The owner decides whether to register it.
    pub fn spawn_acceptor<A: Acceptor>(&mut self, mut acceptor: A) {
        let tx = self.inbox_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                match acceptor.accept().await {
                    Ok(link) => {
                        if tx.send(NetEvent::Incoming(link)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Acceptor stopped: {}", e);
                        break;
                    }
                }
            }
        }));
    }

    /// Blocks until any connection has something to report.
    pub async fn next_event(&mut self) -> Option<NetEvent> {
        self.inbox_rx.recv().await
    }

    /// Sends a frame on a registered connection.
    pub async fn send(&mut self, id: ConnId, frame: &str) -> Result<(), EnvError> {
        let writer = self
            .writers
            .get_mut(&id)
            .ok_or_else(|| EnvError::UnknownConnection(id.to_string()))?;
        writer.write_frame(frame).await
    }

    /// Drops the writer for a closed connection.
    pub fn deregister(&mut self, id: ConnId) {
        self.writers.remove(&id);
        if let Some(label) = self.labels.remove(&id) {
            debug!("Deregistered {} ({})", id, label);
        }
    }

    /// Returns the label a connection was registered with.
    pub fn label(&self, id: ConnId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Returns true if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}
