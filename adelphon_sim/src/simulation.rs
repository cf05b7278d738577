//! In-process game harness.
//!
//! Builds the same topology a spawned deployment has, with every TCP
//! connection replaced by an in-memory [`pair`](adelphon_env::memory::pair):
//!
//! ```text
//!   runner r ──► relayer 0..R ──┬──► sink
//!                    ▲  ▲       │
//!                    └──┴─ mesh ┘
//! ```
//!
//! Each agent owns its own world built from the shared seed, exactly as
//! separate processes would.

use crate::error::NodeError;
use crate::exporter::GameExport;
use crate::relayer::RelayerNode;
use crate::runner::{RunnerNode, RunnerOutcome};
use crate::sink::Sink;
use crate::world::{World, WorldLayout};
use adelphon_core::{GameConfig, Outcome};
use adelphon_env::memory;
use tokio::task::JoinHandle;
use tracing::info;

/// Results from running one game.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Seed used
    pub seed: u64,

    /// Outcome per relayer, indexed by id
    pub relayers: Vec<Outcome>,

    /// Outcome per runner, indexed by id
    pub runners: Vec<RunnerOutcome>,

    /// What the sink recorded
    pub export: GameExport,
}

impl SimulationReport {
    /// True if some runner reached the treasure.
    pub fn won(&self) -> bool {
        self.runners.contains(&RunnerOutcome::FoundTreasure)
    }
}

/// Runs a whole game on the current tokio runtime.
pub struct Simulation {
    config: GameConfig,
    seed: u64,
    layout: WorldLayout,
}

impl Simulation {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            layout: WorldLayout::default(),
        }
    }

    /// Pins parts of the world for every agent.
    pub fn with_layout(mut self, layout: WorldLayout) -> Self {
        self.layout = layout;
        self
    }

    fn world(&self) -> Result<World, NodeError> {
        Ok(World::with_layout(&self.config, self.seed, self.layout.clone())?)
    }

    /// Wires every agent together and plays until all of them finish.
    pub async fn run(self) -> Result<SimulationReport, NodeError> {
        self.config.validate()?;
        let config = &self.config;
        info!(
            "Simulating seed {} with {} relayers and {} runners",
            self.seed, config.num_relayers, config.num_runners
        );

        let mut sink = Sink::new(config, self.seed, self.world()?);
        let mut relayers = Vec::with_capacity(config.num_relayers);
        for id in 0..config.num_relayers as u32 {
            let (to_sink, from_relayer) = memory::pair("sink", &format!("relayer {}", id));
            sink.attach(from_relayer);
            relayers.push(RelayerNode::new(config, id, self.world()?)?.with_sink(to_sink));
        }

        // relayer j dials every i < j
        for j in 0..relayers.len() {
            for i in 0..j {
                let (dialed, accepted) =
                    memory::pair(&format!("relayer {}", i), &format!("relayer {}", j));
                relayers[j].add_peer(i as u32, dialed).await?;
                relayers[i].attach(accepted);
            }
        }

        let mut runners = Vec::with_capacity(config.num_runners);
        for id in 0..config.num_runners as u32 {
            let mut links = Vec::with_capacity(relayers.len());
            for (relayer_id, relayer) in relayers.iter_mut().enumerate() {
                let (runner_side, relayer_side) =
                    memory::pair(&format!("relayer {}", relayer_id), &format!("runner {}", id));
                relayer.attach(relayer_side);
                links.push(runner_side);
            }
            runners.push(RunnerNode::new(config, id, self.world()?, links)?);
        }

        let sink_task = tokio::spawn(sink.run());
        let relayer_tasks: Vec<_> = relayers.into_iter().map(|r| tokio::spawn(r.run())).collect();
        let runner_tasks: Vec<_> = runners.into_iter().map(|r| tokio::spawn(r.run())).collect();

        let runners = join_all(runner_tasks).await?;
        let relayers = join_all(relayer_tasks).await?;
        let export = join(sink_task).await?;

        let report = SimulationReport {
            seed: self.seed,
            relayers,
            runners,
            export,
        };
        info!(
            "Seed {} finished after {} recorded ticks, won: {}",
            report.seed,
            report.export.ticks(),
            report.won()
        );
        Ok(report)
    }
}

async fn join<T>(task: JoinHandle<Result<T, NodeError>>) -> Result<T, NodeError> {
    task.await.map_err(|e| NodeError::Task(e.to_string()))?
}

async fn join_all<T>(tasks: Vec<JoinHandle<Result<T, NodeError>>>) -> Result<Vec<T>, NodeError> {
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(join(task).await?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adelphon_core::Location;
    use std::time::Duration;

    fn open_field(rows: usize, relayers: usize, runners: usize) -> GameConfig {
        GameConfig {
            map_rows: rows,
            map_cols: rows,
            num_relayers: relayers,
            num_runners: runners,
            num_animals: 0,
            terrain_weights: [1.0, 0.0, 0.0, 0.0],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_treasure_in_sight_is_reported_then_won() {
        let layout = WorldLayout {
            treasure: Some(Location::new(10, 10)),
            relayers: Some(vec![Location::new(12, 12)]),
            runner_starts: Some(vec![Location::new(10, 8)]),
            ..Default::default()
        };
        let report = Simulation::new(open_field(100, 1, 1), 42)
            .with_layout(layout)
            .run()
            .await
            .unwrap();

        assert_eq!(report.runners, vec![RunnerOutcome::FoundTreasure]);
        assert_eq!(report.relayers, vec![Outcome::Won]);
        // reported on the first tick, reached two steps later
        assert_eq!(report.export.frames[0].treasure, Some(Location::new(10, 10)));
        assert_eq!(report.export.ticks(), 2);
        assert!(report.export.treasure_found);
    }

    #[tokio::test]
    async fn test_team_explores_and_wins() {
        let run = Simulation::new(open_field(20, 2, 3), 7).run();
        let report = tokio::time::timeout(Duration::from_secs(60), run)
            .await
            .unwrap()
            .unwrap();

        assert!(report.won());
        assert_eq!(report.relayers, vec![Outcome::Won, Outcome::Won]);
        assert!(report.runners.iter().all(|o| *o != RunnerOutcome::Died));
    }

    #[tokio::test]
    async fn test_same_seed_same_game() {
        let config = open_field(16, 1, 2);
        let first = Simulation::new(config.clone(), 3).run().await.unwrap();
        let second = Simulation::new(config, 3).run().await.unwrap();

        assert_eq!(first.runners, second.runners);
        assert_eq!(first.export.ticks(), second.export.ticks());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = open_field(20, 1, 1);
        config.terrain_weights = [0.5, 0.0, 0.0, 0.0];
        let err = Simulation::new(config, 1).run().await.unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
