//! Process spawner.
//!
//! Starts one OS process per agent in dependency order:
//!
//! ```text
//!   visualizer ──IM_UP──► relayer 0 ──IM_UP──► ... relayer N-1 ──IM_UP──► runners
//! ```
//!
//! Every listening agent reports `IM_UP` on the spawner port once its
//! sockets are bound, so nobody dials a port that is not open yet.

use crate::error::NodeError;
use adelphon_core::codec::IM_UP;
use adelphon_core::GameConfig;
use adelphon_env::{tcp_impl, Acceptor};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// One agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Visualizer,
    Relayer(u32),
    Runner(u32),
}

impl AgentKind {
    /// Listening agents announce themselves before the next one starts.
    pub fn announces(self) -> bool {
        !matches!(self, AgentKind::Runner(_))
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Visualizer => write!(f, "visualizer"),
            AgentKind::Relayer(id) => write!(f, "relayer {}", id),
            AgentKind::Runner(id) => write!(f, "runner {}", id),
        }
    }
}

/// Starts agents somewhere.
#[async_trait]
pub trait Launcher: Send {
    /// Starts one agent without waiting for it.
    async fn launch(&mut self, agent: AgentKind) -> Result<(), NodeError>;

    /// Waits for every launched agent to exit.
    async fn wait_all(&mut self) -> Result<(), NodeError>;
}

/// Launches agents as child processes of this executable.
pub struct ProcessLauncher {
    exe: PathBuf,
    seed: u64,
    config_path: Option<String>,
    verbose: bool,
    children: Vec<(AgentKind, Child)>,
}

impl ProcessLauncher {
    pub fn new(seed: u64, config_path: Option<String>, verbose: bool) -> Result<Self, NodeError> {
        Ok(Self {
            exe: std::env::current_exe()?,
            seed,
            config_path,
            verbose,
            children: Vec::new(),
        })
    }

    fn command(&self, agent: AgentKind) -> Command {
        let mut cmd = Command::new(&self.exe);
        if let Some(path) = &self.config_path {
            cmd.arg("--config").arg(path);
        }
        if self.verbose {
            cmd.arg("--verbose");
        }
        match agent {
            AgentKind::Visualizer => cmd.arg("visualizer"),
            AgentKind::Relayer(_) => cmd.arg("relayer"),
            AgentKind::Runner(_) => cmd.arg("runner"),
        };
        cmd.arg("--seed").arg(self.seed.to_string());
        match agent {
            AgentKind::Visualizer => {}
            AgentKind::Relayer(id) | AgentKind::Runner(id) => {
                cmd.arg("--id").arg(id.to_string());
            }
        }
        if agent.announces() {
            cmd.arg("--notify");
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&mut self, agent: AgentKind) -> Result<(), NodeError> {
        let child = self.command(agent).spawn()?;
        debug!("Spawned {} as pid {:?}", agent, child.id());
        self.children.push((agent, child));
        Ok(())
    }

    async fn wait_all(&mut self) -> Result<(), NodeError> {
        let mut failed = Vec::new();
        for (agent, child) in &mut self.children {
            let status = child.wait().await?;
            if status.success() {
                debug!("{} exited", agent);
            } else {
                failed.push(format!("{} ({})", agent, status));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(NodeError::Task(format!("agents failed: {}", failed.join(", "))))
        }
    }
}

/// Starts a whole game through a [`Launcher`].
pub struct Spawner<L: Launcher> {
    num_relayers: usize,
    num_runners: usize,
    launcher: L,
}

impl<L: Launcher> Spawner<L> {
    pub fn new(config: &GameConfig, launcher: L) -> Self {
        Self {
            num_relayers: config.num_relayers,
            num_runners: config.num_runners,
            launcher,
        }
    }

    /// Launches every agent in order, using `acceptor` (bound to the
    /// spawner address) to collect announcements, then waits for all of them.
    pub async fn run<A: Acceptor>(mut self, mut acceptor: A) -> Result<(), NodeError> {
        let agents = std::iter::once(AgentKind::Visualizer)
            .chain((0..self.num_relayers as u32).map(AgentKind::Relayer))
            .chain((0..self.num_runners as u32).map(AgentKind::Runner));

        for agent in agents {
            self.launcher.launch(agent).await?;
            if agent.announces() {
                await_announcement(&mut acceptor, agent).await?;
            }
        }
        info!(
            "All {} agents launched",
            1 + self.num_relayers + self.num_runners
        );
        self.launcher.wait_all().await
    }
}

async fn await_announcement<A: Acceptor>(acceptor: &mut A, agent: AgentKind) -> Result<(), NodeError> {
    let mut link = acceptor.accept().await?;
    let frame = link.recv().await?;
    if frame != IM_UP {
        return Err(NodeError::unexpected(agent, frame));
    }
    debug!("{} is up", agent);
    Ok(())
}

/// Tells the spawner this agent is listening.
pub async fn notify_spawner(config: &GameConfig) -> Result<(), NodeError> {
    let mut link = tcp_impl::connect(&config.spawner_addr()).await?;
    link.send(IM_UP).await?;
    Ok(())
}
