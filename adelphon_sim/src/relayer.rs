//! Relayer process loop.
//!
//! One logical thread per relayer: the [`Multiplexer`] yields one event at a
//! time and each handler runs to completion before the next. Every
//! connection is bound to a [`Role`] by its first frame (the handshake);
//! after that, frames are dispatched to the [`Coordinator`] by role.
//!
//! ```text
//!   runners ──┐                      ┌──► runners (targets / echoes)
//!   peers ────┼──► mux ──► Coordinator ──┼──► peers (merged knowledge)
//!             │                      └──► sink (summary, blocks for ack)
//!   acceptor ─┘
//! ```

use crate::error::NodeError;
use adelphon_core::codec::{decode, encode_hello, MESSAGE_RECEIVED};
use adelphon_core::{
    Action, Coordinator, Frame, GameConfig, Mesh, MeshError, Outcome, Phase, SenderKind, WorldOracle,
};
use adelphon_env::{Acceptor, ConnId, Link, Multiplexer, NetEvent};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Runner(u32),
    Relayer(u32),
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Runner(id) => write!(f, "runner {}", id),
            Role::Relayer(id) => write!(f, "relayer {}", id),
        }
    }
}

/// A relayer process: coordinator, oracle and connections.
pub struct RelayerNode<O: WorldOracle> {
    id: u32,
    num_runners: usize,
    coordinator: Coordinator,
    oracle: O,

    mux: Multiplexer,
    roles: HashMap<ConnId, Role>,
    runners: BTreeMap<u32, ConnId>,
    mesh: Mesh<ConnId>,
    sink: Option<Link>,
}

impl<O: WorldOracle> RelayerNode<O> {
    /// Creates relayer `id` at the position the oracle assigns it.
    pub fn new(config: &GameConfig, id: u32, oracle: O) -> Result<Self, NodeError> {
        let location = oracle
            .relayer_locations()
            .get(id as usize)
            .copied()
            .ok_or_else(|| NodeError::unexpected(format!("relayer {}", id), "no such relayer in world"))?;
        info!("Relayer {} stationed at {}", id, location);

        Ok(Self {
            id,
            num_runners: config.num_runners,
            coordinator: Coordinator::new(config, id, location),
            oracle,
            mux: Multiplexer::new(),
            roles: HashMap::new(),
            runners: BTreeMap::new(),
            mesh: Mesh::new(id, config.num_relayers),
            sink: None,
        })
    }

    /// Attaches the visualization sink.
    pub fn with_sink(mut self, sink: Link) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Accepts runners and higher-numbered relayers from `acceptor`.
    pub fn listen<A: Acceptor>(&mut self, acceptor: A) {
        self.mux.spawn_acceptor(acceptor);
    }

    /// Registers an inbound link whose role arrives with its handshake.
    pub fn attach(&mut self, link: Link) -> ConnId {
        self.mux.register(link)
    }

    /// Introduces this relayer over an outbound link to `peer_id`.
    pub async fn add_peer(&mut self, peer_id: u32, mut link: Link) -> Result<(), NodeError> {
        link.send(&encode_hello(SenderKind::Relayer, self.id)).await?;
        let conn = self.mux.register(link);
        self.bind_relayer(conn, peer_id).await
    }

    /// Peers this relayer must dial before running.
    pub fn dial_targets(&self) -> Vec<u32> {
        self.mesh.dial_targets()
    }

    /// Runs until the game ends for this relayer.
    pub async fn run(mut self) -> Result<Outcome, NodeError> {
        info!("Relayer {} running", self.id);
        loop {
            let event = self
                .mux
                .next_event()
                .await
                .ok_or_else(|| NodeError::lost("multiplexer"))?;

            match event {
                NetEvent::Incoming(link) => {
                    debug!("Relayer {}: incoming {}", self.id, link.label());
                    self.mux.register(link);
                }
                NetEvent::Closed(conn) => self.on_closed(conn)?,
                NetEvent::Frame(conn, raw) => {
                    if let Some(outcome) = self.on_frame(conn, &raw).await? {
                        info!(
                            "Relayer {} finished after {} ticks: {:?}",
                            self.id,
                            self.coordinator.tick(),
                            outcome
                        );
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    async fn on_frame(&mut self, conn: ConnId, raw: &str) -> Result<Option<Outcome>, NodeError> {
        let frame = decode(raw)?;
        let actions = match self.roles.get(&conn).copied() {
            None => {
                self.on_handshake(conn, frame).await?;
                return Ok(None);
            }
            Some(Role::Runner(runner_id)) => {
                self.coordinator
                    .on_runner_frame(runner_id, frame, &mut self.oracle)?
            }
            Some(Role::Relayer(peer_id)) => self.coordinator.on_relayer_frame(peer_id, frame)?,
        };
        self.execute(actions).await
    }

    async fn on_handshake(&mut self, conn: ConnId, frame: Frame) -> Result<(), NodeError> {
        match frame {
            Frame::Hello {
                kind: SenderKind::Runner,
                id,
            } => {
                if id as usize >= self.num_runners || self.runners.contains_key(&id) {
                    return Err(NodeError::unexpected(conn, format!("runner handshake {}", id)));
                }
                debug!("Relayer {}: {} is runner {}", self.id, conn, id);
                self.roles.insert(conn, Role::Runner(id));
                self.runners.insert(id, conn);
                Ok(())
            }
            Frame::Hello {
                kind: SenderKind::Relayer,
                id,
            } => self.bind_relayer(conn, id).await,
            other => Err(NodeError::unexpected(conn, format!("{:?} before handshake", other))),
        }
    }

    async fn bind_relayer(&mut self, conn: ConnId, peer_id: u32) -> Result<(), NodeError> {
        let held = self.mesh.register(peer_id, conn)?;
        self.roles.insert(conn, Role::Relayer(peer_id));
        for frame in held {
            self.mux.send(conn, &frame).await?;
        }
        if self.mesh.is_complete() {
            info!("Relayer {}: mesh complete", self.id);
        }
        Ok(())
    }

    async fn execute(&mut self, actions: Vec<Action>) -> Result<Option<Outcome>, NodeError> {
        for action in actions {
            match action {
                Action::BroadcastToRelayers(frame) => {
                    let outbound = self.mesh.broadcast(&frame).map_err(|e| match e {
                        MeshError::Departed(peer) => NodeError::lost(Role::Relayer(peer)),
                        other => other.into(),
                    })?;
                    for (conn, frame) in outbound {
                        self.mux.send(conn, &frame).await?;
                    }
                }
                Action::ReportToSink(frame) => self.report_to_sink(&frame).await?,
                Action::SendToRunner { runner_id, frame } => {
                    let conn = *self
                        .runners
                        .get(&runner_id)
                        .ok_or_else(|| NodeError::lost(Role::Runner(runner_id)))?;
                    if let Err(e) = self.mux.send(conn, &frame).await {
                        if !self.coordinator.is_won() {
                            return Err(e.into());
                        }
                        debug!("Relayer {}: runner {} already gone: {}", self.id, runner_id, e);
                    }
                }
                Action::Halt(outcome) => return Ok(Some(outcome)),
            }
        }
        Ok(None)
    }

    /// Sends the tick summary and blocks for the acknowledgement.
    async fn report_to_sink(&mut self, frame: &str) -> Result<(), NodeError> {
        let Some(sink) = self.sink.as_mut() else {
            debug!("Relayer {}: no sink attached, summary dropped", self.id);
            return Ok(());
        };
        let ack = sink.request(frame).await.map_err(|e| {
            if e.is_closed() {
                NodeError::lost("visualization sink")
            } else {
                e.into()
            }
        })?;
        if ack != MESSAGE_RECEIVED {
            return Err(NodeError::unexpected("visualization sink", ack));
        }
        Ok(())
    }

    fn on_closed(&mut self, conn: ConnId) -> Result<(), NodeError> {
        self.mux.deregister(conn);
        let Some(role) = self.roles.remove(&conn) else {
            debug!("Relayer {}: {} closed before its handshake", self.id, conn);
            return Ok(());
        };

        let finished = self.coordinator.is_won() || self.coordinator.outcome().is_some();
        match role {
            Role::Runner(runner_id) => {
                self.runners.remove(&runner_id);
                if !finished && self.coordinator.live_runners().contains(&runner_id) {
                    return Err(NodeError::lost(role));
                }
                debug!("Relayer {}: {} disconnected", self.id, role);
            }
            Role::Relayer(peer_id) => {
                self.mesh.depart(peer_id);
                // a peer that has not reported yet can never close this barrier
                if !finished
                    && self.coordinator.phase() == Phase::WaitingForRelayers
                    && !self.coordinator.heard_from_relayer(peer_id)
                {
                    return Err(NodeError::lost(role));
                }
                if !finished {
                    warn!("Relayer {}: {} left early", self.id, role);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{World, WorldLayout};
    use adelphon_core::codec::{decode_summary, Report, Signal, I_WON, OUT_OF_RANGE, WE_WON};
    use adelphon_core::Location;
    use adelphon_env::memory;

    fn single_config() -> GameConfig {
        GameConfig {
            num_relayers: 1,
            num_runners: 1,
            num_animals: 0,
            ..Default::default()
        }
    }

    fn world(config: &GameConfig) -> World {
        let layout = WorldLayout {
            treasure: Some(Location::new(10, 10)),
            relayers: Some(vec![Location::new(12, 12)]),
            runner_starts: Some(vec![Location::new(10, 8)]),
            ..Default::default()
        };
        World::with_layout(config, 5, layout).unwrap()
    }

    fn report(location: Location) -> String {
        Report::new(SenderKind::Runner, 0, vec![location]).encode(32)
    }

    #[tokio::test]
    async fn test_runner_tick_and_sink_ack() {
        let config = single_config();
        let mut node = RelayerNode::new(&config, 0, world(&config)).unwrap();
        let (relayer_side, mut runner) = memory::pair("runner 0", "relayer 0");
        let (sink_link, mut sink) = memory::pair("sink", "relayer 0");
        node.attach(relayer_side);
        let node = node.with_sink(sink_link);
        let task = tokio::spawn(node.run());

        runner.send(&encode_hello(SenderKind::Runner, 0)).await.unwrap();
        runner.send(&report(Location::new(10, 8))).await.unwrap();

        let summary = decode_summary(&sink.recv().await.unwrap()).unwrap();
        assert_eq!(summary.relayer_id, 0);
        assert_eq!(summary.runners, vec![Location::new(10, 8)]);
        sink.send(MESSAGE_RECEIVED).await.unwrap();

        match decode(&runner.recv().await.unwrap()).unwrap() {
            Frame::Report(reply) => assert_eq!(reply.locations.len(), 1),
            other => panic!("unexpected reply {:?}", other),
        }

        runner.send(I_WON).await.unwrap();
        assert_eq!(runner.recv().await.unwrap(), WE_WON);
        assert_eq!(task.await.unwrap().unwrap(), Outcome::Won);
    }

    #[tokio::test]
    async fn test_out_of_range_is_echoed() {
        let config = single_config();
        let mut node = RelayerNode::new(&config, 0, world(&config)).unwrap();
        let (relayer_side, mut runner) = memory::pair("runner 0", "relayer 0");
        node.attach(relayer_side);
        let task = tokio::spawn(node.run());

        runner.send(&encode_hello(SenderKind::Runner, 0)).await.unwrap();
        runner.send(OUT_OF_RANGE).await.unwrap();
        assert_eq!(runner.recv().await.unwrap(), OUT_OF_RANGE);

        runner.send(Signal::ImDead.as_str()).await.unwrap();
        assert_eq!(task.await.unwrap().unwrap(), Outcome::AllRunnersDead);
    }

    #[tokio::test]
    async fn test_frame_before_handshake_is_fatal() {
        let config = single_config();
        let mut node = RelayerNode::new(&config, 0, world(&config)).unwrap();
        let (relayer_side, mut runner) = memory::pair("runner 0", "relayer 0");
        node.attach(relayer_side);
        let task = tokio::spawn(node.run());

        runner.send(OUT_OF_RANGE).await.unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, NodeError::UnexpectedFrame { .. }));
    }

    #[tokio::test]
    async fn test_runner_lost_mid_game() {
        let config = single_config();
        let mut node = RelayerNode::new(&config, 0, world(&config)).unwrap();
        let (relayer_side, mut runner) = memory::pair("runner 0", "relayer 0");
        node.attach(relayer_side);
        let task = tokio::spawn(node.run());

        runner.send(&encode_hello(SenderKind::Runner, 0)).await.unwrap();
        drop(runner);
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, NodeError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn test_two_relayers_exchange_before_replying() {
        let config = GameConfig {
            num_relayers: 2,
            num_runners: 1,
            num_animals: 0,
            ..Default::default()
        };
        let layout = WorldLayout {
            relayers: Some(vec![Location::new(20, 20), Location::new(30, 30)]),
            runner_starts: Some(vec![Location::new(25, 25)]),
            ..Default::default()
        };
        let mut node = RelayerNode::new(&config, 0, World::with_layout(&config, 8, layout).unwrap()).unwrap();
        let (relayer_side, mut runner) = memory::pair("runner 0", "relayer 0");
        let (mesh_side, mut peer) = memory::pair("relayer 1", "relayer 0");
        node.attach(relayer_side);
        node.attach(mesh_side);
        let task = tokio::spawn(node.run());

        peer.send(&encode_hello(SenderKind::Relayer, 1)).await.unwrap();
        runner.send(&encode_hello(SenderKind::Runner, 0)).await.unwrap();
        runner.send(&report(Location::new(25, 25))).await.unwrap();

        // merged knowledge first, nothing for the runner yet
        match decode(&peer.recv().await.unwrap()).unwrap() {
            Frame::Report(merged) => {
                assert_eq!(merged.kind, SenderKind::Relayer);
                assert_eq!(merged.locations, vec![Location::new(25, 25)]);
            }
            other => panic!("unexpected frame {:?}", other),
        }

        peer.send(&Report::new(SenderKind::Relayer, 1, vec![]).encode(128))
            .await
            .unwrap();
        assert!(matches!(
            decode(&runner.recv().await.unwrap()).unwrap(),
            Frame::Report(_)
        ));

        runner.send(I_WON).await.unwrap();
        assert_eq!(runner.recv().await.unwrap(), WE_WON);
        assert_eq!(task.await.unwrap().unwrap(), Outcome::Won);
    }
}
