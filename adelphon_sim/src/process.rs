//! TCP wiring for one agent per OS process.
//!
//! Port layout (see [`GameConfig`]):
//!
//! ```text
//!   port_start - 2        spawner announcements
//!   port_start - 1        visualization sink
//!   port_start + i        relayer i, runner-facing
//!   port_start + R + i    relayer i, relayer-facing
//! ```

use crate::error::NodeError;
use crate::exporter::GameExport;
use crate::relayer::RelayerNode;
use crate::runner::{RunnerNode, RunnerOutcome};
use crate::sink::Sink;
use crate::spawn::notify_spawner;
use crate::world::World;
use adelphon_core::{GameConfig, Outcome};
use adelphon_env::tcp_impl::{self, TcpAcceptor};
use tracing::info;

/// Binds both relayer ports, joins the mesh and plays.
///
/// Lower-numbered relayers and the sink must already be listening.
pub async fn run_relayer(
    config: &GameConfig,
    seed: u64,
    id: u32,
    notify: bool,
) -> Result<Outcome, NodeError> {
    let world = World::new(config, seed)?;
    let mut node = RelayerNode::new(config, id, world)?;

    node.listen(TcpAcceptor::bind(&config.relayer_runner_addr(id)).await?);
    node.listen(TcpAcceptor::bind(&config.relayer_peer_addr(id)).await?);
    let sink = tcp_impl::connect(&config.sink_addr()).await?;
    let mut node = node.with_sink(sink);

    for peer in node.dial_targets() {
        let link = tcp_impl::connect(&config.relayer_peer_addr(peer)).await?;
        node.add_peer(peer, link).await?;
    }
    info!(
        "Relayer {} listening on {} and {}",
        id,
        config.relayer_runner_addr(id),
        config.relayer_peer_addr(id)
    );

    if notify {
        notify_spawner(config).await?;
    }
    node.run().await
}

/// Dials every relayer in id order and plays.
pub async fn run_runner(config: &GameConfig, seed: u64, id: u32) -> Result<RunnerOutcome, NodeError> {
    let world = World::new(config, seed)?;
    let mut relayers = Vec::with_capacity(config.num_relayers);
    for relayer_id in 0..config.num_relayers as u32 {
        relayers.push(tcp_impl::connect(&config.relayer_runner_addr(relayer_id)).await?);
    }
    RunnerNode::new(config, id, world, relayers)?.run().await
}

/// Serves the sink port until every relayer has disconnected, then writes
/// the export if a path is given.
pub async fn run_visualizer(
    config: &GameConfig,
    seed: u64,
    notify: bool,
    export_path: Option<&str>,
) -> Result<GameExport, NodeError> {
    let mut sink = Sink::new(config, seed, World::new(config, seed)?);
    sink.listen(TcpAcceptor::bind(&config.sink_addr()).await?);
    info!("Visualizer listening on {}", config.sink_addr());

    if notify {
        notify_spawner(config).await?;
    }
    let export = sink.run().await?;
    if let Some(path) = export_path {
        export.write_to_file(path)?;
        info!("Wrote {} ticks to {}", export.ticks(), path);
    }
    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::{AgentKind, Launcher, Spawner};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    /// Runs each agent as a task on this runtime instead of a process.
    struct TaskLauncher {
        config: GameConfig,
        seed: u64,
        handles: Vec<JoinHandle<Result<(), NodeError>>>,
    }

    #[async_trait]
    impl Launcher for TaskLauncher {
        async fn launch(&mut self, agent: AgentKind) -> Result<(), NodeError> {
            let config = self.config.clone();
            let seed = self.seed;
            self.handles.push(tokio::spawn(async move {
                match agent {
                    AgentKind::Visualizer => run_visualizer(&config, seed, true, None).await.map(|_| ()),
                    AgentKind::Relayer(id) => run_relayer(&config, seed, id, true).await.map(|_| ()),
                    AgentKind::Runner(id) => run_runner(&config, seed, id).await.map(|_| ()),
                }
            }));
            Ok(())
        }

        async fn wait_all(&mut self) -> Result<(), NodeError> {
            for handle in self.handles.drain(..) {
                handle.await.map_err(|e| NodeError::Task(e.to_string()))??;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tcp_game_runs_to_completion() {
        let config = GameConfig {
            map_rows: 12,
            map_cols: 12,
            num_relayers: 2,
            num_runners: 2,
            num_animals: 0,
            terrain_weights: [1.0, 0.0, 0.0, 0.0],
            port_start: 47310,
            ..Default::default()
        };
        let launcher = TaskLauncher {
            config: config.clone(),
            seed: 11,
            handles: Vec::new(),
        };
        let acceptor = TcpAcceptor::bind(&config.spawner_addr()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(60), Spawner::new(&config, launcher).run(acceptor))
            .await
            .unwrap()
            .unwrap();
    }
}
