//! Adelphon CLI
//!
//! One binary for every role. `spawn` starts a full game as child
//! processes of this executable; `simulate` plays one in-process.

use adelphon_core::GameConfig;
use adelphon_env::tcp_impl::TcpAcceptor;
use adelphon_sim::process::{run_relayer, run_runner, run_visualizer};
use adelphon_sim::{NodeError, ProcessLauncher, Simulation, Spawner};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Adelphon treasure hunt
#[derive(Parser, Debug)]
#[command(name = "adelphon")]
#[command(about = "Relayers, runners and a treasure nobody has seen yet", long_about = None)]
struct Cli {
    /// JSON game configuration (defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run relayer ID
    Relayer {
        #[arg(short, long)]
        seed: u64,
        #[arg(long)]
        id: u32,
        /// Announce readiness to the spawner
        #[arg(long)]
        notify: bool,
    },
    /// Run runner ID
    Runner {
        #[arg(short, long)]
        seed: u64,
        #[arg(long)]
        id: u32,
    },
    /// Run the visualization sink
    Visualizer {
        #[arg(short, long)]
        seed: u64,
        /// Write recorded ticks to this JSON file
        #[arg(long)]
        export: Option<String>,
        #[arg(long)]
        notify: bool,
    },
    /// Start every agent as a separate process
    Spawn {
        #[arg(short, long)]
        seed: u64,
    },
    /// Play a whole game inside this process
    Simulate {
        #[arg(short, long, default_value = "42")]
        seed: u64,
        #[arg(long)]
        export: Option<String>,
    },
}

fn load_config(path: Option<&str>) -> Result<GameConfig, NodeError> {
    let config = match path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => GameConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli, config: GameConfig) -> Result<(), NodeError> {
    match cli.command {
        Command::Relayer { seed, id, notify } => {
            let outcome = run_relayer(&config, seed, id, notify).await?;
            info!("Relayer {} done: {:?}", id, outcome);
        }
        Command::Runner { seed, id } => {
            let outcome = run_runner(&config, seed, id).await?;
            info!("Runner {} done: {:?}", id, outcome);
        }
        Command::Visualizer {
            seed,
            export,
            notify,
        } => {
            run_visualizer(&config, seed, notify, export.as_deref()).await?;
        }
        Command::Spawn { seed } => {
            let acceptor = TcpAcceptor::bind(&config.spawner_addr()).await?;
            let launcher = ProcessLauncher::new(seed, cli.config.clone(), cli.verbose)?;
            Spawner::new(&config, launcher).run(acceptor).await?;
            info!("Game with seed {} complete", seed);
        }
        Command::Simulate { seed, export } => {
            let report = Simulation::new(config, seed).run().await?;
            info!(
                "Seed {}: won={} after {} ticks, runners {:?}",
                seed,
                report.won(),
                report.export.ticks(),
                report.runners
            );
            if let Some(path) = export {
                report.export.write_to_file(&path)?;
                info!("Exported {} frames to {}", report.export.ticks(), path);
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        tokio::select! {
            result = run(cli, config) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                Ok(())
            }
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
