//! Runner process loop.
//!
//! A runner is the active party of every tick:
//! 1. move one step toward its target (unless still waiting out terrain)
//! 2. query the oracle at its new position
//! 3. send its report to every relayer in range, the out-of-range sentinel
//!    to the rest
//! 4. block for exactly one reply from each relayer, in id order
//! 5. pick the next target

use crate::error::NodeError;
use adelphon_core::codec::{decode, encode_hello, I_WON, IM_DEAD, OUT_OF_RANGE};
use adelphon_core::{
    Frame, GameConfig, KnowledgeStore, Location, Navigator, SenderKind, Signal, WorldOracle,
};
use adelphon_env::Link;
use tracing::{debug, info};

/// How the game ended for one runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerOutcome {
    /// This runner stepped onto the treasure
    FoundTreasure,
    /// Another runner found it
    TeamWon,
    Died,
}

/// A runner process: its own beliefs plus one link per relayer.
pub struct RunnerNode<O: WorldOracle> {
    id: u32,
    comm_radius: f64,
    message_limit: usize,
    oracle: O,
    store: KnowledgeStore,
    navigator: Navigator,

    /// Indexed by relayer id
    relayers: Vec<Link>,
    relayer_locations: Vec<Location>,

    location: Location,
    target: Option<Location>,
    wait: u32,
    just_moved: bool,
    ticks: u64,
}

impl<O: WorldOracle> RunnerNode<O> {
    /// Creates runner `id` with one connected link per relayer, in id order.
    pub fn new(
        config: &GameConfig,
        id: u32,
        oracle: O,
        relayers: Vec<Link>,
    ) -> Result<Self, NodeError> {
        let location = oracle
            .runner_start_locations()
            .get(id as usize)
            .copied()
            .ok_or_else(|| NodeError::unexpected(format!("runner {}", id), "no such runner in world"))?;
        let relayer_locations = oracle.relayer_locations().to_vec();
        if relayers.len() != relayer_locations.len() {
            return Err(NodeError::unexpected(
                format!("runner {}", id),
                format!("{} relayer links for {} relayers", relayers.len(), relayer_locations.len()),
            ));
        }

        Ok(Self {
            id,
            comm_radius: config.comm_radius,
            message_limit: config.runner_message_limit,
            oracle,
            store: KnowledgeStore::for_runner(config),
            navigator: Navigator::new(config),
            relayers,
            relayer_locations,
            location,
            target: None,
            wait: 0,
            just_moved: false,
            ticks: 0,
        })
    }

    /// Introduces itself to every relayer, then plays until the game ends.
    pub async fn run(mut self) -> Result<RunnerOutcome, NodeError> {
        let hello = encode_hello(SenderKind::Runner, self.id);
        for link in &mut self.relayers {
            link.send(&hello).await?;
        }
        info!("Runner {} starting at {}", self.id, self.location);

        loop {
            if let Some(outcome) = self.tick().await? {
                info!(
                    "Runner {} finished after {} ticks at {}: {:?}",
                    self.id, self.ticks, self.location, outcome
                );
                return Ok(outcome);
            }
        }
    }

    /// Plays one tick. Returns the outcome once the game is over.
    pub async fn tick(&mut self) -> Result<Option<RunnerOutcome>, NodeError> {
        self.ticks += 1;
        self.advance()?;

        let state = self.oracle.query(self.location, true);
        if state.won {
            info!("Runner {} found the treasure at {}", self.id, self.location);
            self.broadcast(I_WON).await?;
            return self.await_game_over().await.map(Some);
        }
        if !state.alive {
            info!("Runner {} was killed at {}", self.id, self.location);
            self.broadcast(IM_DEAD).await?;
            return Ok(Some(RunnerOutcome::Died));
        }
        // terrain only slows a runner that just stepped onto it
        if self.just_moved {
            self.wait = state.wait_time;
            self.just_moved = false;
        }

        let view = state.local_view.unwrap_or_default();
        let report = view.to_report(SenderKind::Runner, self.id, vec![self.location]);
        self.store.observe(&report);
        let frame = report.encode(self.message_limit);

        let in_range: Vec<bool> = self
            .relayer_locations
            .iter()
            .map(|relayer| relayer.euclidean(self.location) <= self.comm_radius)
            .collect();
        for (link, &reachable) in self.relayers.iter_mut().zip(&in_range) {
            link.send(if reachable { frame.as_str() } else { OUT_OF_RANGE }).await?;
        }

        let mut assigned = None;
        for relayer_id in 0..self.relayers.len() {
            let raw = self.reply_from(relayer_id).await?;
            match decode(&raw)? {
                Frame::Signal(Signal::WeWon) => return Ok(Some(RunnerOutcome::TeamWon)),
                Frame::Signal(Signal::OutOfRange) => {}
                Frame::Report(reply) if reply.kind == SenderKind::Relayer => {
                    reply.validate(self.store.bounds())?;
                    self.store.merge(&reply);
                    // the lowest-id relayer in range decides
                    if assigned.is_none() {
                        assigned = reply.locations.first().copied();
                    }
                }
                _ => {
                    return Err(NodeError::unexpected(format!("relayer {}", relayer_id), raw));
                }
            }
        }

        self.retarget(assigned, in_range.contains(&true));
        debug!(
            "Runner {} tick {}: at {}, target {:?}, wait {}",
            self.id, self.ticks, self.location, self.target, self.wait
        );
        Ok(None)
    }

    /// Takes one step unless waiting or without a target.
    fn advance(&mut self) -> Result<(), NodeError> {
        if self.wait > 0 {
            self.wait -= 1;
            return Ok(());
        }
        if let Some(target) = self.target.filter(|t| *t != self.location) {
            self.location = self.navigator.next_step(self.location, target, &self.store)?;
            self.just_moved = true;
        }
        Ok(())
    }

    fn retarget(&mut self, assigned: Option<Location>, any_in_range: bool) {
        if self.target == Some(self.location) {
            self.target = None;
        }
        if let Some(treasure) = self.store.treasure() {
            self.target = Some(treasure);
        } else if let Some(target) = assigned {
            self.target = Some(target);
        } else if !any_in_range && self.target.is_none() {
            // nobody can hear us; walk back into range
            self.target = self
                .relayer_locations
                .iter()
                .copied()
                .min_by_key(|relayer| (relayer.chebyshev(self.location), *relayer));
        }
    }

    async fn broadcast(&mut self, signal: &str) -> Result<(), NodeError> {
        for link in &mut self.relayers {
            link.send(signal).await?;
        }
        Ok(())
    }

    /// After winning, every relayer answers with the game-over signal.
    async fn await_game_over(&mut self) -> Result<RunnerOutcome, NodeError> {
        let raw = self.reply_from(0).await?;
        match decode(&raw)? {
            Frame::Signal(Signal::WeWon) => Ok(RunnerOutcome::FoundTreasure),
            _ => Err(NodeError::unexpected("relayer 0", raw)),
        }
    }

    async fn reply_from(&mut self, relayer_id: usize) -> Result<String, NodeError> {
        self.relayers[relayer_id].recv().await.map_err(|e| {
            if e.is_closed() {
                NodeError::lost(format!("relayer {}", relayer_id))
            } else {
                e.into()
            }
        })
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn target(&self) -> Option<Location> {
        self.target
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{World, WorldLayout};
    use adelphon_core::codec::{Report, WE_WON};
    use adelphon_env::memory;

    fn config() -> GameConfig {
        GameConfig {
            num_relayers: 1,
            num_runners: 1,
            num_animals: 0,
            terrain_weights: [1.0, 0.0, 0.0, 0.0],
            ..Default::default()
        }
    }

    fn runner_with(relayer_at: Location, start: Location) -> (RunnerNode<World>, Link) {
        let config = config();
        let layout = WorldLayout {
            treasure: Some(Location::new(10, 10)),
            relayers: Some(vec![relayer_at]),
            runner_starts: Some(vec![start]),
            ..Default::default()
        };
        let world = World::with_layout(&config, 21, layout).unwrap();
        let (runner_side, relayer_side) = memory::pair("relayer 0", "runner 0");
        let node = RunnerNode::new(&config, 0, world, vec![runner_side]).unwrap();
        (node, relayer_side)
    }

    #[tokio::test]
    async fn test_first_report_carries_treasure() {
        let (mut node, mut relayer) = runner_with(Location::new(12, 12), Location::new(10, 8));

        let responder = tokio::spawn(async move {
            let report = relayer.recv().await.unwrap();
            let mut reply = Report::new(SenderKind::Relayer, 0, vec![Location::new(10, 10)]);
            reply.treasure = Some(Location::new(10, 10));
            relayer.send(&reply.encode(128)).await.unwrap();
            (relayer, report)
        });

        assert_eq!(node.tick().await.unwrap(), None);
        let (_relayer, report) = responder.await.unwrap();
        match decode(&report).unwrap() {
            Frame::Report(report) => {
                assert_eq!(report.locations, vec![Location::new(10, 8)]);
                assert_eq!(report.treasure, Some(Location::new(10, 10)));
                assert!(report.encode(32).len() <= 32);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(node.target(), Some(Location::new(10, 10)));
    }

    #[tokio::test]
    async fn test_out_of_range_heads_for_relayer() {
        let (mut node, mut relayer) = runner_with(Location::new(90, 90), Location::new(30, 30));

        let responder = tokio::spawn(async move {
            let frame = relayer.recv().await.unwrap();
            relayer.send(OUT_OF_RANGE).await.unwrap();
            (relayer, frame)
        });

        assert_eq!(node.tick().await.unwrap(), None);
        let (_relayer, frame) = responder.await.unwrap();
        assert_eq!(frame, OUT_OF_RANGE);
        assert_eq!(node.target(), Some(Location::new(90, 90)));
    }

    #[tokio::test]
    async fn test_walks_onto_treasure_and_wins() {
        let (node, mut relayer) = runner_with(Location::new(12, 12), Location::new(10, 8));

        let responder = tokio::spawn(async move {
            assert_eq!(relayer.recv().await.unwrap(), "0|0");
            loop {
                let frame = relayer.recv().await.unwrap();
                if frame == I_WON {
                    relayer.send(WE_WON).await.unwrap();
                    return;
                }
                let mut reply = Report::new(SenderKind::Relayer, 0, vec![Location::new(10, 10)]);
                reply.treasure = Some(Location::new(10, 10));
                relayer.send(&reply.encode(128)).await.unwrap();
            }
        });

        assert_eq!(node.run().await.unwrap(), RunnerOutcome::FoundTreasure);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_team_win_ends_game() {
        let (mut node, mut relayer) = runner_with(Location::new(12, 12), Location::new(10, 8));

        let responder = tokio::spawn(async move {
            relayer.recv().await.unwrap();
            relayer.send(WE_WON).await.unwrap();
            relayer
        });

        assert_eq!(node.tick().await.unwrap(), Some(RunnerOutcome::TeamWon));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_relayer_loss_is_fatal() {
        let (mut node, relayer) = runner_with(Location::new(12, 12), Location::new(10, 8));
        drop(relayer);
        assert!(node.tick().await.is_err());
    }
}
