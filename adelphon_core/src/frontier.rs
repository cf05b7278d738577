//! The Frontier Target Selector (relayer side).
//!
//! Picks where a runner should head next:
//! 1. the treasure, once anyone has seen it;
//! 2. otherwise the runner's previous (sticky) target while it is unchecked;
//! 3. otherwise the first unchecked cell on an expanding Chebyshev ring
//!    around the runner.
//!
//! Runners move in 8 directions, so every cell on ring `r` is exactly `r`
//! unobstructed steps away.

use crate::grid::{Bounds, Location};
use crate::knowledge::KnowledgeStore;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Frontier search failures.
#[derive(Debug, Error, PartialEq)]
pub enum FrontierError {
    /// Every ring up to the map's maximum radius is fully checked. With
    /// correct marking the runners would have found the treasure first.
    #[error("No unchecked cell reachable from {from} (searched radius {min_radius}..={max_radius})")]
    Exhausted {
        from: Location,
        min_radius: usize,
        max_radius: usize,
    },
}

/// Selects the next target for a runner standing at `runner`.
pub fn select_target(
    runner: Location,
    store: &KnowledgeStore,
    sticky: Option<Location>,
    min_radius: usize,
) -> Result<Location, FrontierError> {
    if let Some(treasure) = store.treasure() {
        return Ok(treasure);
    }

    if let Some(target) = sticky {
        if !store.is_checked(target) {
            return Ok(target);
        }
    }

    let bounds = store.bounds();
    let max_radius = bounds.max_radius();
    let min_radius = min_radius.max(1);
    for radius in min_radius..=max_radius {
        if let Some(cell) = ring(bounds, runner, radius)
            .into_iter()
            .find(|cell| !store.is_checked(*cell))
        {
            debug!("Frontier for {} found {} at radius {}", runner, cell, radius);
            return Ok(cell);
        }
    }

    Err(FrontierError::Exhausted {
        from: runner,
        min_radius,
        max_radius,
    })
}

/// Cells at exactly Chebyshev distance `radius` from `center`, clipped to
/// the map: top edge, bottom edge, then left and right edges without the
/// corners.
pub fn ring(bounds: Bounds, center: Location, radius: usize) -> Vec<Location> {
    if radius == 0 {
        return vec![center];
    }

    let r = radius as i64;
    let (row, col) = (center.row as i64, center.col as i64);
    let rows = bounds.rows as i64;
    let cols = bounds.cols as i64;
    let col_span = (col - r).max(0)..=(col + r).min(cols - 1);
    let row_span = (row - r + 1).max(0)..=(row + r - 1).min(rows - 1);

    let mut cells = Vec::new();
    for edge_row in [row - r, row + r] {
        if (0..rows).contains(&edge_row) {
            cells.extend(
                col_span
                    .clone()
                    .map(|c| Location::new(edge_row as usize, c as usize)),
            );
        }
    }
    for edge_col in [col - r, col + r] {
        if (0..cols).contains(&edge_col) {
            cells.extend(
                row_span
                    .clone()
                    .map(|rr| Location::new(rr as usize, edge_col as usize)),
            );
        }
    }
    cells
}

/// Sticky targets a relayer has handed out, per runner id.
#[derive(Debug, Default)]
pub struct TargetBook {
    targets: BTreeMap<u32, Location>,
}

impl TargetBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects (or keeps) the target for `runner_id` and remembers it.
    pub fn assign(
        &mut self,
        runner_id: u32,
        runner: Location,
        store: &KnowledgeStore,
        min_radius: usize,
    ) -> Result<Location, FrontierError> {
        let sticky = self.targets.get(&runner_id).copied();
        let target = select_target(runner, store, sticky, min_radius)?;
        if sticky != Some(target) {
            debug!("Runner {} retargeted to {}", runner_id, target);
        }
        self.targets.insert(runner_id, target);
        Ok(target)
    }

    pub fn get(&self, runner_id: u32) -> Option<Location> {
        self.targets.get(&runner_id).copied()
    }

    /// Drops the target of a runner that left the game.
    pub fn forget(&mut self, runner_id: u32) {
        self.targets.remove(&runner_id);
    }
}
