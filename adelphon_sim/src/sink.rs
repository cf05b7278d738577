//! Visualization sink.
//!
//! Relayers send one summary per tick and block until it is acknowledged.
//! Once every relayer has reported a tick, the sink steps its own copy of
//! the world (keeping animals in lockstep with the agents) and records a
//! [`TickFrame`]. The sink runs until every relayer has hung up.

use crate::error::NodeError;
use crate::exporter::{GameExport, TickFrame};
use crate::world::World;
use adelphon_core::codec::{decode_summary, MESSAGE_RECEIVED};
use adelphon_core::{GameConfig, KnowledgeStore, Location, Summary, WorldOracle};
use adelphon_env::{Acceptor, ConnId, Link, Multiplexer, NetEvent};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Collects relayer summaries into a replayable export.
pub struct Sink {
    num_relayers: usize,
    world: World,
    mux: Multiplexer,
    /// Connections ever registered
    connections: usize,

    tick: u64,
    pending: BTreeMap<u32, Summary>,
    beliefs: KnowledgeStore,
    export: GameExport,
}

impl Sink {
    pub fn new(config: &GameConfig, seed: u64, world: World) -> Self {
        let export = GameExport::new(seed, config.map_rows, config.map_cols, world.treasure());
        Self {
            num_relayers: config.num_relayers,
            world,
            mux: Multiplexer::new(),
            connections: 0,
            tick: 0,
            pending: BTreeMap::new(),
            beliefs: KnowledgeStore::for_runner(config),
            export,
        }
    }

    /// Accepts relayer connections from `acceptor`.
    pub fn listen<A: Acceptor>(&mut self, acceptor: A) {
        self.mux.spawn_acceptor(acceptor);
    }

    /// Registers an already connected relayer link.
    pub fn attach(&mut self, link: Link) -> ConnId {
        self.connections += 1;
        self.mux.register(link)
    }

    /// Acknowledges summaries until every relayer has disconnected.
    pub async fn run(mut self) -> Result<GameExport, NodeError> {
        info!("Sink waiting for {} relayers", self.num_relayers);
        while let Some(event) = self.mux.next_event().await {
            match event {
                NetEvent::Incoming(link) => {
                    debug!("Sink: incoming {}", link.label());
                    self.attach(link);
                }
                NetEvent::Frame(conn, raw) => self.on_summary(conn, &raw).await?,
                NetEvent::Closed(conn) => {
                    self.mux.deregister(conn);
                    if self.mux.is_empty() && self.connections >= self.num_relayers {
                        break;
                    }
                }
            }
        }

        if !self.pending.is_empty() {
            debug!("Sink: discarding partial tick from {} relayers", self.pending.len());
        }
        self.export.finalize();
        info!(
            "Sink recorded {} ticks, treasure found: {}",
            self.export.ticks(),
            self.export.treasure_found
        );
        Ok(self.export)
    }

    async fn on_summary(&mut self, conn: ConnId, raw: &str) -> Result<(), NodeError> {
        let summary = decode_summary(raw)?;
        if summary.relayer_id as usize >= self.num_relayers {
            return Err(NodeError::unexpected(conn, raw));
        }
        self.mux.send(conn, MESSAGE_RECEIVED).await?;

        if self.pending.insert(summary.relayer_id, summary).is_some() {
            warn!("Sink: relayer reported twice in tick {}", self.tick + 1);
        }
        if self.pending.len() == self.num_relayers {
            self.record_tick();
        }
        Ok(())
    }

    fn record_tick(&mut self) {
        self.tick += 1;
        // same per-tick animal step as every agent
        self.world.query(Location::new(0, 0), false);

        let summaries: Vec<Summary> = std::mem::take(&mut self.pending).into_values().collect();
        let mut frame = TickFrame::from_summaries(self.tick, &summaries);
        frame.animals = self.world.animals().iter().map(|a| a.location).collect();

        for summary in &summaries {
            if let Some(treasure) = summary.treasure {
                self.beliefs.learn_treasure(treasure);
            }
            for obs in &summary.terrain {
                self.beliefs.learn_terrain(*obs);
            }
        }
        frame.revealed = self.beliefs.fresh_terrain().iter().map(|&obs| obs.into()).collect();
        frame.known_cells = self.beliefs.known_terrain_count();
        self.beliefs.reset_tick();

        debug!(
            "Sink tick {}: {} runners heard, {} cells revealed",
            self.tick,
            frame.runners.len(),
            frame.revealed.len()
        );
        self.export.add_frame(frame);
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}
