//! Relayer mesh bookkeeping.
//!
//! Full mesh over relayer ids: relayer `i` dials every `j < i` and accepts
//! from every `j > i`, so a relayer only ever dials peers that are already
//! listening.
//!
//! ```text
//!   R0 ◀──── R1 ◀──── R2
//!    ▲                 │
//!    └─────────────────┘
//! ```
//!
//! Peers are keyed by whatever handle the process loop uses for a
//! connection. A broadcast issued before a peer's handshake arrives is
//! held back and flushed when the peer registers.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq)]
pub enum MeshError {
    #[error("Relayer {0} is not a peer of this mesh")]
    UnknownPeer(u32),

    #[error("Relayer {0} registered twice")]
    DuplicatePeer(u32),

    #[error("Relayer {0} left the mesh")]
    Departed(u32),
}

#[derive(Debug)]
enum Slot<K> {
    Pending(Vec<String>),
    Connected(K),
    Departed,
}

/// Connection table for the other relayers.
#[derive(Debug)]
pub struct Mesh<K> {
    id: u32,
    peers: BTreeMap<u32, Slot<K>>,
}

impl<K: Clone + PartialEq> Mesh<K> {
    /// Mesh seen from relayer `id` among `num_relayers`.
    pub fn new(id: u32, num_relayers: usize) -> Self {
        let peers = (0..num_relayers as u32)
            .filter(|&peer| peer != id)
            .map(|peer| (peer, Slot::Pending(Vec::new())))
            .collect();
        Self { id, peers }
    }

    /// Peers this relayer must dial, in order.
    pub fn dial_targets(&self) -> Vec<u32> {
        (0..self.id).collect()
    }

    /// Number of peers that will dial in.
    pub fn expected_inbound(&self) -> usize {
        self.peers.keys().filter(|&&peer| peer > self.id).count()
    }

    /// Binds `peer_id` to `key`; returns the frames held back for it.
    pub fn register(&mut self, peer_id: u32, key: K) -> Result<Vec<String>, MeshError> {
        let slot = self
            .peers
            .get_mut(&peer_id)
            .ok_or(MeshError::UnknownPeer(peer_id))?;
        match std::mem::replace(slot, Slot::Connected(key)) {
            Slot::Pending(backlog) => {
                debug!(
                    "Relayer {}: peer {} registered ({} held frames)",
                    self.id,
                    peer_id,
                    backlog.len()
                );
                Ok(backlog)
            }
            previous => {
                *slot = previous;
                Err(MeshError::DuplicatePeer(peer_id))
            }
        }
    }

    /// Addresses `frame` to every connected peer and holds it for pending
    /// ones. Fails if any peer already left.
    pub fn broadcast(&mut self, frame: &str) -> Result<Vec<(K, String)>, MeshError> {
        let mut out = Vec::new();
        for (&peer_id, slot) in self.peers.iter_mut() {
            match slot {
                Slot::Connected(key) => out.push((key.clone(), frame.to_string())),
                Slot::Pending(backlog) => backlog.push(frame.to_string()),
                Slot::Departed => return Err(MeshError::Departed(peer_id)),
            }
        }
        Ok(out)
    }

    /// Peer id bound to `key`, if any.
    pub fn peer_of(&self, key: &K) -> Option<u32> {
        self.peers.iter().find_map(|(&peer_id, slot)| match slot {
            Slot::Connected(k) if k == key => Some(peer_id),
            _ => None,
        })
    }

    /// Marks a peer whose connection closed.
    pub fn depart(&mut self, peer_id: u32) {
        if let Some(slot) = self.peers.get_mut(&peer_id) {
            if !matches!(slot, Slot::Departed) {
                warn!("Relayer {}: peer {} departed", self.id, peer_id);
            }
            *slot = Slot::Departed;
        }
    }

    pub fn is_departed(&self, peer_id: u32) -> bool {
        matches!(self.peers.get(&peer_id), Some(Slot::Departed))
    }

    /// Every peer has registered (and none left).
    pub fn is_complete(&self) -> bool {
        self.peers
            .values()
            .all(|slot| matches!(slot, Slot::Connected(_)))
    }

    pub fn connected(&self) -> usize {
        self.peers
            .values()
            .filter(|slot| matches!(slot, Slot::Connected(_)))
            .count()
    }
}
