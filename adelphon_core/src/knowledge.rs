//! The Knowledge Store - one agent's accumulated belief about the world.
//!
//! Merge rules:
//! - **Terrain** is static ground truth: the first report for a cell wins and
//!   is never overwritten. A later, different report is handed to the
//!   [`ConflictHook`] and otherwise ignored.
//! - **Animals** move every tick, so sightings never accumulate across ticks.
//!   [`KnowledgeStore::observe`] replaces the set; [`KnowledgeStore::merge`]
//!   unions within the current tick until [`KnowledgeStore::reset_tick`].
//! - **Treasure** is write-once.
//! - **Checked cells** (relayer stores only) are set around every reported
//!   runner position and never cleared.

use crate::codec::{Report, SenderKind, TerrainObservation};
use crate::config::GameConfig;
use crate::grid::{Bounds, Location, Terrain};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Receives terrain reports that contradict what the store already knows.
///
/// This is where liar or sensor-fault detection would plug in. The store
/// keeps its first value whatever the hook does.
pub trait ConflictHook: Send {
    fn on_terrain_conflict(&mut self, location: Location, known: Terrain, reported: Terrain);
}

/// Default hook: log and move on.
#[derive(Debug, Default)]
pub struct LogConflicts;

impl ConflictHook for LogConflicts {
    fn on_terrain_conflict(&mut self, location: Location, known: Terrain, reported: Terrain) {
        warn!(
            "Conflicting terrain at {}: known {:?}, reported {:?}",
            location, known, reported
        );
    }
}

/// Per-process belief store.
pub struct KnowledgeStore {
    bounds: Bounds,
    treasure_radius: f64,

    terrain: Vec<Option<Terrain>>,
    known_terrain: usize,
    animals: BTreeSet<Location>,
    treasure: Option<Location>,

    /// Present on relayer stores only
    checked: Option<Vec<bool>>,
    unchecked: usize,

    // Per-tick transient state
    runner_locations: BTreeSet<Location>,
    fresh_terrain: Vec<TerrainObservation>,

    conflicts: Box<dyn ConflictHook>,
    conflict_count: u64,
}

impl KnowledgeStore {
    /// Store for a runner: no checked-for-treasure grid.
    pub fn for_runner(config: &GameConfig) -> Self {
        Self::build(config, false)
    }

    /// Store for a relayer: tracks explored cells.
    pub fn for_relayer(config: &GameConfig) -> Self {
        Self::build(config, true)
    }

    fn build(config: &GameConfig, track_checked: bool) -> Self {
        let bounds = config.bounds();
        let cells = bounds.cell_count();
        Self {
            bounds,
            treasure_radius: config.treasure_radius,
            terrain: vec![None; cells],
            known_terrain: 0,
            animals: BTreeSet::new(),
            treasure: None,
            checked: track_checked.then(|| vec![false; cells]),
            unchecked: cells,
            runner_locations: BTreeSet::new(),
            fresh_terrain: Vec::new(),
            conflicts: Box::new(LogConflicts),
            conflict_count: 0,
        }
    }

    /// Replaces the terrain conflict hook.
    pub fn with_conflict_hook(mut self, hook: Box<dyn ConflictHook>) -> Self {
        self.conflicts = hook;
        self
    }

    /// Absorbs a report from a single source; its animal list *replaces*
    /// the believed animal set. On a relayer store a runner report also
    /// marks the cells around the runner as checked.
    pub fn observe(&mut self, report: &Report) {
        self.animals.clear();
        self.absorb(report);
    }

    /// Absorbs one of several reports for the current tick; animals are
    /// unioned with what this tick already reported.
    pub fn merge(&mut self, report: &Report) {
        self.absorb(report);
    }

    fn absorb(&mut self, report: &Report) {
        for obs in &report.terrain {
            self.learn_terrain(*obs);
        }
        if let Some(treasure) = report.treasure {
            self.learn_treasure(treasure);
        }
        for &animal in &report.animals {
            if self.bounds.contains(animal) {
                self.animals.insert(animal);
            }
        }
        if report.kind == SenderKind::Runner && self.tracks_checked() {
            for &runner in &report.locations {
                self.record_runner(runner);
            }
        }
    }

    /// Records terrain for one cell. Returns true if the cell was new.
    pub fn learn_terrain(&mut self, obs: TerrainObservation) -> bool {
        if !self.bounds.contains(obs.location) {
            warn!("Ignoring terrain off the map at {}", obs.location);
            return false;
        }
        let idx = self.bounds.index(obs.location);
        match self.terrain[idx] {
            None => {
                self.terrain[idx] = Some(obs.terrain);
                self.known_terrain += 1;
                self.fresh_terrain.push(obs);
                true
            }
            Some(known) if known == obs.terrain => false,
            Some(known) => {
                self.conflict_count += 1;
                self.conflicts
                    .on_terrain_conflict(obs.location, known, obs.terrain);
                false
            }
        }
    }

    /// Records the treasure location. The first value is permanent.
    pub fn learn_treasure(&mut self, location: Location) {
        match self.treasure {
            None => {
                info!("Treasure located at {}", location);
                self.treasure = Some(location);
            }
            Some(known) if known == location => {}
            Some(known) => {
                warn!(
                    "Contradictory treasure report {} (keeping {})",
                    location, known
                );
            }
        }
    }

    /// Notes a runner position heard this tick and marks everything within
    /// the treasure-detection radius as searched.
    pub fn record_runner(&mut self, location: Location) {
        if !self.bounds.contains(location) {
            warn!("Ignoring runner position off the map at {}", location);
            return;
        }
        self.runner_locations.insert(location);

        let Some(checked) = self.checked.as_mut() else {
            return;
        };
        for cell in self.bounds.cells_within(location, self.treasure_radius) {
            let idx = self.bounds.index(cell);
            if !checked[idx] {
                checked[idx] = true;
                self.unchecked -= 1;
            }
        }
    }

    /// Clears state that is only valid for one tick.
    pub fn reset_tick(&mut self) {
        debug!(
            "Tick reset: dropping {} animals, {} runner positions, {} fresh cells",
            self.animals.len(),
            self.runner_locations.len(),
            self.fresh_terrain.len()
        );
        self.animals.clear();
        self.runner_locations.clear();
        self.fresh_terrain.clear();
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn terrain_at(&self, location: Location) -> Option<Terrain> {
        if !self.bounds.contains(location) {
            return None;
        }
        self.terrain[self.bounds.index(location)]
    }

    /// Wait time of a cell, 0 when the terrain is unknown.
    pub fn wait_cost(&self, location: Location) -> u32 {
        self.terrain_at(location).map_or(0, Terrain::wait_time)
    }

    pub fn treasure(&self) -> Option<Location> {
        self.treasure
    }

    pub fn animals(&self) -> &BTreeSet<Location> {
        &self.animals
    }

    /// Animals ordered nearest-first from `from` (ties by location).
    pub fn animals_near(&self, from: Location) -> Vec<Location> {
        let mut animals: Vec<Location> = self.animals.iter().copied().collect();
        animals.sort_by_key(|a| (a.chebyshev(from), *a));
        animals
    }

    /// Whether a cell has been searched. Runner stores never mark cells.
    pub fn is_checked(&self, location: Location) -> bool {
        match &self.checked {
            Some(checked) if self.bounds.contains(location) => {
                checked[self.bounds.index(location)]
            }
            _ => false,
        }
    }

    pub fn tracks_checked(&self) -> bool {
        self.checked.is_some()
    }

    pub fn unchecked_count(&self) -> usize {
        self.unchecked
    }

    pub fn known_terrain_count(&self) -> usize {
        self.known_terrain
    }

    pub fn conflict_count(&self) -> u64 {
        self.conflict_count
    }

    /// Runner positions heard this tick.
    pub fn runner_locations(&self) -> Vec<Location> {
        self.runner_locations.iter().copied().collect()
    }

    /// Cells first learned during this tick.
    pub fn fresh_terrain(&self) -> &[TerrainObservation] {
        &self.fresh_terrain
    }

    /// Every known cell, row-major.
    pub fn known_terrain(&self) -> Vec<TerrainObservation> {
        self.terrain
            .iter()
            .enumerate()
            .filter_map(|(idx, terrain)| {
                terrain.map(|t| TerrainObservation::new(self.bounds.location(idx), t))
            })
            .collect()
    }

    /// Known cells inside the box spanning `a` and `b`, grown by `margin`.
    pub fn terrain_between(&self, a: Location, b: Location, margin: usize) -> Vec<TerrainObservation> {
        self.bounds
            .rect_cells(a, b, margin)
            .filter_map(|cell| self.terrain_at(cell).map(|t| TerrainObservation::new(cell, t)))
            .collect()
    }
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("bounds", &self.bounds)
            .field("known_terrain", &self.known_terrain)
            .field("animals", &self.animals.len())
            .field("treasure", &self.treasure)
            .field("unchecked", &self.unchecked)
            .finish()
    }
}
