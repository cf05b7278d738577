//! Adelphon agent processes and simulation harness
//!
//! Everything that talks to the outside world lives here: the seeded world
//! oracle, the relayer and runner loops driving the Sans-IO engines from
//! `adelphon_core`, the visualization sink, and two ways of running a game.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Spawner (one OS process per agent)  |  Simulation (tasks)  │
//! └─────────────────────────────────────────────────────────────┘
//!        │                                    │
//!   ┌────▼─────┐   report / reply   ┌─────────▼──┐   summary   ┌──────┐
//!   │  Runner  │◄──────────────────►│  Relayer   │────────────►│ Sink │
//!   └────┬─────┘                    └──┬──────▲──┘   ack       └──┬───┘
//!        │ query                 query │ mesh │                   │ query
//!   ┌────▼─────────────────────────────▼──────┴───────────────────▼───┐
//!   │           World (one copy per agent, same seed)                 │
//!   └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use adelphon_sim::Simulation;
//! use adelphon_core::GameConfig;
//!
//! let report = Simulation::new(GameConfig::default(), 42).run().await?;
//! println!("won: {}", report.won());
//! ```

mod error;
mod exporter;
pub mod process;
mod relayer;
mod runner;
mod simulation;
mod sink;
pub mod spawn;
mod world;

pub use error::NodeError;
pub use exporter::{GameExport, TerrainCell, TickFrame};
pub use relayer::{RelayerNode, Role};
pub use runner::{RunnerNode, RunnerOutcome};
pub use simulation::{Simulation, SimulationReport};
pub use sink::Sink;
pub use spawn::{AgentKind, Launcher, ProcessLauncher, Spawner};
pub use world::{Animal, World, WorldLayout};
