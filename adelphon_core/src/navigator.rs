//! The Navigator (runner side) - one cost-weighted step toward a target.
//!
//! Dijkstra runs *backward* from the target over the 8-connected grid. The
//! cost of entering a cell is one step plus the cell's believed wait time
//! (unknown terrain is assumed flat). The search stops as soon as the
//! runner's own cell is finalized; the neighbour it was relaxed from is the
//! next hop. No full path tree is built.
//!
//! With a non-zero `hazard_penalty`, cells around believed animals carry that
//! extra cost so the route bends away from them. It is off by default.

use crate::config::GameConfig;
use crate::grid::{Bounds, Location};
use crate::knowledge::KnowledgeStore;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use thiserror::Error;

/// Navigator failures. All of them are caller errors.
#[derive(Debug, Error, PartialEq)]
pub enum NavError {
    /// The caller must pick a new target first.
    #[error("Already at target {0}")]
    AlreadyAtTarget(Location),

    #[error("Location {0} is off the map")]
    OutOfBounds(Location),

    #[error("No route from {from} to {to}")]
    Unreachable { from: Location, to: Location },
}

/// Shortest-path stepper bound to one map.
#[derive(Debug, Clone)]
pub struct Navigator {
    bounds: Bounds,
    hazard_radius: f64,
    hazard_penalty: u64,
}

impl Navigator {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            bounds: config.bounds(),
            // animals move up to one cell before the runner gets there
            hazard_radius: config.kill_radius + config.animal_range as f64,
            hazard_penalty: config.hazard_penalty,
        }
    }

    /// Returns the single next cell on a cheapest route from `current` to
    /// `target` under the beliefs in `store`.
    pub fn next_step(
        &self,
        current: Location,
        target: Location,
        store: &KnowledgeStore,
    ) -> Result<Location, NavError> {
        for loc in [current, target] {
            if !self.bounds.contains(loc) {
                return Err(NavError::OutOfBounds(loc));
            }
        }
        if current == target {
            return Err(NavError::AlreadyAtTarget(target));
        }

        let cells = self.bounds.cell_count();
        let hazards = self.hazard_mask(store, target);
        let start = self.bounds.index(current);
        let goal = self.bounds.index(target);

        let mut dist = vec![u64::MAX; cells];
        let mut toward_target: Vec<Option<usize>> = vec![None; cells];
        let mut done = vec![false; cells];
        let mut frontier = BinaryHeap::new();

        dist[goal] = 0;
        frontier.push(Reverse((0u64, goal)));

        while let Some(Reverse((cost, idx))) = frontier.pop() {
            if done[idx] {
                continue;
            }
            done[idx] = true;

            if idx == start {
                return toward_target[idx]
                    .map(|next| self.bounds.location(next))
                    .ok_or(NavError::Unreachable {
                        from: current,
                        to: target,
                    });
            }

            // every neighbour reaches the target through this cell by
            // stepping onto it
            let cell = self.bounds.location(idx);
            let enter = self.enter_cost(cell, store, &hazards);
            for neighbor in self.bounds.neighbors(cell) {
                let n = self.bounds.index(neighbor);
                if done[n] {
                    continue;
                }
                let candidate = cost + enter;
                if candidate < dist[n] {
                    dist[n] = candidate;
                    toward_target[n] = Some(idx);
                    frontier.push(Reverse((candidate, n)));
                }
            }
        }

        Err(NavError::Unreachable {
            from: current,
            to: target,
        })
    }

    fn enter_cost(&self, cell: Location, store: &KnowledgeStore, hazards: &[bool]) -> u64 {
        let base = 1 + u64::from(store.wait_cost(cell));
        if hazards.is_empty() || !hazards[self.bounds.index(cell)] {
            base
        } else {
            base + self.hazard_penalty
        }
    }

    /// Cells near believed animals, excluding the target. Empty when no
    /// animals are believed (or penalties are off).
    fn hazard_mask(&self, store: &KnowledgeStore, target: Location) -> Vec<bool> {
        if store.animals().is_empty() || self.hazard_penalty == 0 {
            return Vec::new();
        }
        let mut mask = vec![false; self.bounds.cell_count()];
        for &animal in store.animals() {
            for cell in self.bounds.cells_within(animal, self.hazard_radius) {
                mask[self.bounds.index(cell)] = true;
            }
        }
        mask[self.bounds.index(target)] = false;
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Report, SenderKind, TerrainObservation};
    use crate::grid::Terrain;

    fn small_config() -> GameConfig {
        GameConfig {
            map_rows: 10,
            map_cols: 10,
            ..Default::default()
        }
    }

    fn walk(nav: &Navigator, store: &KnowledgeStore, from: Location, to: Location) -> Vec<Location> {
        let mut path = Vec::new();
        let mut here = from;
        while here != to {
            let next = nav.next_step(here, to, store).unwrap();
            assert_eq!(next.chebyshev(here), 1, "steps must be adjacent");
            path.push(next);
            here = next;
            assert!(path.len() <= 100, "runaway path");
        }
        path
    }

    #[test]
    fn test_flat_map_straight_line() {
        let config = small_config();
        let nav = Navigator::new(&config);
        let mut store = KnowledgeStore::for_runner(&config);
        for row in 0..10 {
            for col in 0..10 {
                store.learn_terrain(TerrainObservation::new(
                    Location::new(row, col),
                    Terrain::FlatGround,
                ));
            }
        }

        let target = Location::new(0, 3);
        let path = walk(&nav, &store, Location::new(0, 0), target);
        assert_eq!(path.len(), 3);

        let mut previous = Location::new(0, 0).chebyshev(target);
        for step in path {
            let distance = step.chebyshev(target);
            assert_eq!(distance + 1, previous);
            previous = distance;
        }
    }

    #[test]
    fn test_routes_around_quicksand() {
        let config = small_config();
        let nav = Navigator::new(&config);
        let mut store = KnowledgeStore::for_runner(&config);
        store.learn_terrain(TerrainObservation::new(Location::new(0, 1), Terrain::Quicksand));
        store.learn_terrain(TerrainObservation::new(Location::new(1, 1), Terrain::FlatGround));

        let step = nav
            .next_step(Location::new(0, 0), Location::new(0, 2), &store)
            .unwrap();
        assert_eq!(step, Location::new(1, 1));
    }

    #[test]
    fn test_quicksand_taken_when_it_is_the_target() {
        let config = small_config();
        let nav = Navigator::new(&config);
        let mut store = KnowledgeStore::for_runner(&config);
        store.learn_terrain(TerrainObservation::new(Location::new(0, 1), Terrain::Quicksand));

        let step = nav
            .next_step(Location::new(0, 0), Location::new(0, 1), &store)
            .unwrap();
        assert_eq!(step, Location::new(0, 1));
    }

    #[test]
    fn test_unknown_terrain_is_optimistic() {
        let config = small_config();
        let nav = Navigator::new(&config);
        let store = KnowledgeStore::for_runner(&config);

        let path = walk(&nav, &store, Location::new(9, 9), Location::new(2, 4));
        assert_eq!(path.len(), 7);
    }

    #[test]
    fn test_already_at_target_is_caller_error() {
        let config = small_config();
        let nav = Navigator::new(&config);
        let store = KnowledgeStore::for_runner(&config);
        let here = Location::new(4, 4);

        assert_eq!(
            nav.next_step(here, here, &store),
            Err(NavError::AlreadyAtTarget(here))
        );
        assert_eq!(
            nav.next_step(here, Location::new(10, 0), &store),
            Err(NavError::OutOfBounds(Location::new(10, 0)))
        );
    }

    #[test]
    fn test_bends_away_from_animals() {
        let config = GameConfig {
            hazard_penalty: 25,
            ..small_config()
        };
        let nav = Navigator::new(&config);
        let mut store = KnowledgeStore::for_runner(&config);
        let mut sighting = Report::new(SenderKind::Runner, 0, vec![Location::new(5, 0)]);
        sighting.animals = vec![Location::new(5, 5)];
        store.observe(&sighting);

        let path = walk(&nav, &store, Location::new(5, 0), Location::new(5, 9));
        let hazard_radius = config.kill_radius + config.animal_range as f64;
        for step in &path {
            assert!(step.euclidean(Location::new(5, 5)) > hazard_radius);
        }
    }

    #[test]
    fn test_animals_leave_costs_alone_by_default() {
        let config = small_config();
        let nav = Navigator::new(&config);
        let mut store = KnowledgeStore::for_runner(&config);
        let mut sighting = Report::new(SenderKind::Runner, 0, vec![Location::new(0, 0)]);
        sighting.terrain = vec![
            TerrainObservation::new(Location::new(0, 1), Terrain::Mud),
            TerrainObservation::new(Location::new(1, 1), Terrain::FlatGround),
        ];
        sighting.animals = vec![Location::new(3, 1)];
        store.observe(&sighting);

        // flat detour costs 2, mud costs 1 + its wait
        let step = nav
            .next_step(Location::new(0, 0), Location::new(0, 2), &store)
            .unwrap();
        assert_eq!(step, Location::new(1, 1));
    }

    #[test]
    fn test_deterministic() {
        let config = small_config();
        let nav = Navigator::new(&config);
        let store = KnowledgeStore::for_runner(&config);
        let a = nav.next_step(Location::new(0, 0), Location::new(7, 3), &store);
        let b = nav.next_step(Location::new(0, 0), Location::new(7, 3), &store);
        assert_eq!(a, b);
    }
}
