//! The world oracle seam.
//!
//! Agents never see ground truth directly. Once per tick each runner and
//! each relayer asks the oracle about its own position; the call also
//! advances animal motion for the tick.

use crate::codec::{Report, SenderKind, TerrainObservation};
use crate::grid::Location;

/// What an agent can perceive from where it stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalView {
    /// Terrain window centred on the agent, clipped to the map
    pub terrain: Vec<TerrainObservation>,

    /// Animals within the sighting radius
    pub animals: Vec<Location>,

    /// Treasure, when within the detection radius
    pub treasure: Option<Location>,
}

impl LocalView {
    /// Packs the view into an (unencoded) report.
    pub fn to_report(&self, kind: SenderKind, id: u32, locations: Vec<Location>) -> Report {
        Report {
            kind,
            id,
            locations,
            treasure: self.treasure,
            animals: self.animals.clone(),
            terrain: self.terrain.clone(),
        }
    }
}

/// Result of one oracle query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub alive: bool,
    pub won: bool,
    /// Ticks the agent must stay on its current cell
    pub wait_time: u32,
    /// Present only while alive and not yet won
    pub local_view: Option<LocalView>,
}

impl GameState {
    pub fn is_over(&self) -> bool {
        !self.alive || self.won
    }
}

/// Ground truth, consulted once per tick per agent.
pub trait WorldOracle: Send {
    /// Advances animals one step, then reports what an agent at `location`
    /// experiences. Relayers pass `is_runner = false` and can neither die
    /// nor win.
    fn query(&mut self, location: Location, is_runner: bool) -> GameState;

    /// Fixed relayer positions, indexed by relayer id.
    fn relayer_locations(&self) -> &[Location];

    /// Runner start positions, indexed by runner id.
    fn runner_start_locations(&self) -> &[Location];
}
