//! The Synchronization Coordinator - the relayer's epoch-barrier state machine.
//!
//! ```text
//!            all live runners heard             all other relayers heard
//!   ┌──────────────────┐ ──────────────▶ ┌───────────────────┐
//!   │ WaitingForRunners│                 │ WaitingForRelayers│
//!   └──────────────────┘ ◀────────────── └───────────────────┘
//!            ▲          sink report, replies, reset
//!            │
//!            └── won latched: WE_WON to every runner, halt
//! ```
//!
//! The coordinator never touches a socket. It consumes decoded frames and
//! returns [`Action`]s; the process loop performs them in order.

use crate::codec::{
    CodecError, Frame, Report, SenderKind, Signal, Summary, OUT_OF_RANGE, WE_WON,
};
use crate::config::GameConfig;
use crate::frontier::{FrontierError, TargetBook};
use crate::grid::Location;
use crate::knowledge::KnowledgeStore;
use crate::oracle::WorldOracle;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Barrier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForRunners,
    WaitingForRelayers,
}

/// Why a relayer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    AllRunnersDead,
}

/// Side effects requested by the coordinator, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send to every other relayer in the mesh
    BroadcastToRelayers(String),
    /// Send to the visualization sink and wait for its acknowledgement
    ReportToSink(String),
    SendToRunner { runner_id: u32, frame: String },
    Halt(Outcome),
}

/// Coordinator failures. All of them are fatal for the relayer.
#[derive(Debug, Error, PartialEq)]
pub enum CoordinatorError {
    #[error("Unexpected frame from {from} while {phase:?}: {detail}")]
    UnexpectedFrame {
        from: String,
        phase: Phase,
        detail: String,
    },

    #[error("Unknown or departed runner {0}")]
    UnknownRunner(u32),

    #[error("Unknown relayer {0}")]
    UnknownRelayer(u32),

    #[error("{from} reported twice in tick {tick}")]
    DuplicateReport { from: String, tick: u64 },

    #[error("Runner {runner_id} sent {found} locations, expected 1")]
    BadLocationCount { runner_id: u32, found: usize },

    #[error("Coordinator already halted ({0:?})")]
    Halted(Outcome),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] FrontierError),
}

/// What a runner contributed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attendance {
    Reported(Location),
    OutOfRange,
    Won,
}

/// One relayer's view of the barrier protocol.
#[derive(Debug)]
pub struct Coordinator {
    id: u32,
    location: Location,
    num_relayers: usize,
    relayer_limit: usize,
    sink_limit: usize,
    min_radius: usize,
    reply_margin: usize,

    store: KnowledgeStore,
    targets: TargetBook,

    phase: Phase,
    tick: u64,
    live_runners: BTreeSet<u32>,
    runners_heard: BTreeMap<u32, Attendance>,
    relayers_heard: BTreeSet<u32>,
    won: bool,
    outcome: Option<Outcome>,
}

impl Coordinator {
    /// Creates the coordinator for relayer `id` stationed at `location`.
    pub fn new(config: &GameConfig, id: u32, location: Location) -> Self {
        Self {
            id,
            location,
            num_relayers: config.num_relayers,
            relayer_limit: config.relayer_message_limit,
            sink_limit: config.sink_message_limit,
            min_radius: config.frontier_min_radius,
            reply_margin: config.terrain_range / 2,
            store: KnowledgeStore::for_relayer(config),
            targets: TargetBook::new(),
            phase: Phase::WaitingForRunners,
            tick: 0,
            live_runners: (0..config.num_runners as u32).collect(),
            runners_heard: BTreeMap::new(),
            relayers_heard: BTreeSet::new(),
            won: false,
            outcome: None,
        }
    }

    /// Handles one frame from runner `runner_id`.
    pub fn on_runner_frame(
        &mut self,
        runner_id: u32,
        frame: Frame,
        oracle: &mut dyn WorldOracle,
    ) -> Result<Vec<Action>, CoordinatorError> {
        self.ensure_running()?;
        if self.phase != Phase::WaitingForRunners {
            return Err(self.unexpected(format!("runner {}", runner_id), "runner frame"));
        }
        if !self.live_runners.contains(&runner_id) {
            return Err(CoordinatorError::UnknownRunner(runner_id));
        }
        if self.runners_heard.contains_key(&runner_id) {
            return Err(CoordinatorError::DuplicateReport {
                from: format!("runner {}", runner_id),
                tick: self.tick,
            });
        }

        match frame {
            Frame::Report(report) => {
                if report.kind != SenderKind::Runner || report.id != runner_id {
                    return Err(self.unexpected(
                        format!("runner {}", runner_id),
                        &format!("report from {:?} {}", report.kind, report.id),
                    ));
                }
                let location = match report.locations.as_slice() {
                    &[location] => location,
                    other => {
                        return Err(CoordinatorError::BadLocationCount {
                            runner_id,
                            found: other.len(),
                        })
                    }
                };
                report.validate(self.store.bounds())?;
                self.store.merge(&report);
                self.runners_heard
                    .insert(runner_id, Attendance::Reported(location));
            }
            Frame::Signal(Signal::OutOfRange) => {
                self.runners_heard.insert(runner_id, Attendance::OutOfRange);
            }
            Frame::Signal(Signal::IWon) => {
                info!("Relayer {}: runner {} found the treasure", self.id, runner_id);
                self.won = true;
                self.runners_heard.insert(runner_id, Attendance::Won);
            }
            Frame::Signal(Signal::ImDead) => {
                info!("Relayer {}: runner {} died", self.id, runner_id);
                self.live_runners.remove(&runner_id);
                self.targets.forget(runner_id);
                if self.live_runners.is_empty() {
                    return Ok(self.halt(Outcome::AllRunnersDead));
                }
            }
            other => {
                return Err(self.unexpected(format!("runner {}", runner_id), &format!("{:?}", other)));
            }
        }

        debug!(
            "Relayer {} tick {}: {}/{} runners heard",
            self.id,
            self.tick,
            self.runners_heard.len(),
            self.live_runners.len()
        );

        if self.runners_heard.len() < self.live_runners.len() {
            return Ok(Vec::new());
        }
        self.close_runner_barrier(oracle)
    }

    /// Handles one merged-knowledge frame from peer relayer `relayer_id`.
    ///
    /// Frames from a peer that is already a phase ahead arrive while this
    /// relayer still waits for runners; they are merged and counted
    /// immediately.
    pub fn on_relayer_frame(
        &mut self,
        relayer_id: u32,
        frame: Frame,
    ) -> Result<Vec<Action>, CoordinatorError> {
        self.ensure_running()?;
        if relayer_id == self.id || relayer_id as usize >= self.num_relayers {
            return Err(CoordinatorError::UnknownRelayer(relayer_id));
        }
        if self.relayers_heard.contains(&relayer_id) {
            return Err(CoordinatorError::DuplicateReport {
                from: format!("relayer {}", relayer_id),
                tick: self.tick,
            });
        }

        let report = match frame {
            Frame::Report(report) if report.kind == SenderKind::Relayer && report.id == relayer_id => {
                report
            }
            other => {
                return Err(self.unexpected(format!("relayer {}", relayer_id), &format!("{:?}", other)));
            }
        };
        report.validate(self.store.bounds())?;
        self.store.merge(&report);
        for &runner in &report.locations {
            self.store.record_runner(runner);
        }
        self.relayers_heard.insert(relayer_id);

        debug!(
            "Relayer {} tick {}: {}/{} peers heard",
            self.id,
            self.tick,
            self.relayers_heard.len(),
            self.peer_count()
        );

        if self.phase == Phase::WaitingForRelayers && self.relayer_barrier_closed() {
            return self.close_relayer_barrier();
        }
        Ok(Vec::new())
    }

    fn close_runner_barrier(
        &mut self,
        oracle: &mut dyn WorldOracle,
    ) -> Result<Vec<Action>, CoordinatorError> {
        if self.won {
            let mut actions: Vec<Action> = self
                .live_runners
                .iter()
                .map(|&runner_id| Action::SendToRunner {
                    runner_id,
                    frame: WE_WON.to_string(),
                })
                .collect();
            actions.extend(self.halt(Outcome::Won));
            return Ok(actions);
        }

        // keeps this relayer in step with the shared animal motion
        let state = oracle.query(self.location, false);
        if let Some(view) = state.local_view {
            self.store
                .merge(&view.to_report(SenderKind::Relayer, self.id, Vec::new()));
        }

        let mut actions = Vec::new();
        if self.peer_count() > 0 {
            let mut outbound = Report::new(
                SenderKind::Relayer,
                self.id,
                self.store.runner_locations(),
            );
            outbound.treasure = self.store.treasure();
            outbound.animals = self.store.animals().iter().copied().collect();
            outbound.terrain = self.store.fresh_terrain().to_vec();
            actions.push(Action::BroadcastToRelayers(
                outbound.encode(self.relayer_limit),
            ));
        }
        self.phase = Phase::WaitingForRelayers;

        if self.relayer_barrier_closed() {
            actions.extend(self.close_relayer_barrier()?);
        }
        Ok(actions)
    }

    fn close_relayer_barrier(&mut self) -> Result<Vec<Action>, CoordinatorError> {
        let summary = Summary {
            relayer_id: self.id,
            treasure: self.store.treasure(),
            animals: self.store.animals().iter().copied().collect(),
            terrain: self.store.known_terrain(),
            runners: self.store.runner_locations(),
        };
        let mut actions = vec![Action::ReportToSink(summary.encode(self.sink_limit))];

        let heard: Vec<(u32, Attendance)> =
            self.runners_heard.iter().map(|(&id, &a)| (id, a)).collect();
        for (runner_id, attendance) in heard {
            let frame = match attendance {
                Attendance::Reported(runner) => self.reply_for(runner_id, runner)?,
                Attendance::OutOfRange => OUT_OF_RANGE.to_string(),
                // a latched win halts at the runner barrier
                Attendance::Won => WE_WON.to_string(),
            };
            actions.push(Action::SendToRunner { runner_id, frame });
        }

        self.store.reset_tick();
        self.runners_heard.clear();
        self.relayers_heard.clear();
        self.phase = Phase::WaitingForRunners;
        self.tick += 1;
        debug!("Relayer {} starting tick {}", self.id, self.tick);
        Ok(actions)
    }

    /// Target plus the knowledge relevant to reaching it.
    fn reply_for(&mut self, runner_id: u32, runner: Location) -> Result<String, CoordinatorError> {
        let target = self
            .targets
            .assign(runner_id, runner, &self.store, self.min_radius)?;
        let mut reply = Report::new(SenderKind::Relayer, self.id, vec![target]);
        reply.treasure = self.store.treasure();
        reply.animals = self.store.animals_near(runner);
        reply.terrain = self.store.terrain_between(runner, target, self.reply_margin);
        Ok(reply.encode(self.relayer_limit))
    }

    fn halt(&mut self, outcome: Outcome) -> Vec<Action> {
        info!("Relayer {} halting: {:?}", self.id, outcome);
        self.outcome = Some(outcome);
        vec![Action::Halt(outcome)]
    }

    fn ensure_running(&self) -> Result<(), CoordinatorError> {
        match self.outcome {
            Some(outcome) => Err(CoordinatorError::Halted(outcome)),
            None => Ok(()),
        }
    }

    fn unexpected(&self, from: String, detail: &str) -> CoordinatorError {
        warn!("Relayer {}: unexpected frame from {}: {}", self.id, from, detail);
        CoordinatorError::UnexpectedFrame {
            from,
            phase: self.phase,
            detail: detail.to_string(),
        }
    }

    fn peer_count(&self) -> usize {
        self.num_relayers.saturating_sub(1)
    }

    fn relayer_barrier_closed(&self) -> bool {
        self.relayers_heard.len() >= self.peer_count()
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_won(&self) -> bool {
        self.won
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn live_runners(&self) -> &BTreeSet<u32> {
        &self.live_runners
    }

    pub fn runner_attendance(&self) -> usize {
        self.runners_heard.len()
    }

    pub fn relayer_attendance(&self) -> usize {
        self.relayers_heard.len()
    }

    /// Whether peer `relayer_id` already reported this tick.
    pub fn heard_from_relayer(&self, relayer_id: u32) -> bool {
        self.relayers_heard.contains(&relayer_id)
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }
}
