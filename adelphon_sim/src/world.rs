//! Ground truth world for one game.
//!
//! The World maintains the "God's eye view" every agent process rebuilds from
//! the shared seed:
//! - Terrain of every cell (static)
//! - Treasure location (static)
//! - Relayer locations and runner start locations (static)
//! - Animal positions and headings (advanced once per query)
//!
//! Every process holds its own copy. The copies stay in lockstep because
//! each process queries exactly once per tick and animal motion never depends
//! on where the query was made.

use adelphon_core::codec::TerrainObservation;
use adelphon_core::{Bounds, ConfigError, GameConfig, GameState, LocalView, Location, Terrain, WorldOracle};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

/// Attempts at finding an on-map heading before an animal stays put.
const MAX_HEADING_ATTEMPTS: usize = 64;

/// Positions pinned over the generated ones.
///
/// Generation always consumes the same random draws, so overriding one
/// element never shifts the others.
#[derive(Debug, Clone, Default)]
pub struct WorldLayout {
    pub treasure: Option<Location>,
    pub animals: Option<Vec<Location>>,
    pub relayers: Option<Vec<Location>>,
    pub runner_starts: Option<Vec<Location>>,
}

/// A ground truth animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Animal {
    pub location: Location,
    /// Step applied each tick as (rows, cols)
    pub heading: (i64, i64),
}

/// The seeded world oracle.
pub struct World {
    bounds: Bounds,
    terrain: Vec<Terrain>,
    treasure: Location,
    animals: Vec<Animal>,
    relayers: Vec<Location>,
    runner_starts: Vec<Location>,

    /// RNG for animal motion, continued from generation
    rng: ChaCha8Rng,

    animal_range: i64,
    direction_change_prob: f64,
    kill_radius: f64,
    animal_radius: f64,
    treasure_radius: f64,
    view_half: usize,

    /// Number of animal steps taken
    steps: u64,
}

impl World {
    /// Generates the world for `seed`.
    pub fn new(config: &GameConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_layout(config, seed, WorldLayout::default())
    }

    /// Generates the world for `seed`, then applies `layout`.
    pub fn with_layout(config: &GameConfig, seed: u64, layout: WorldLayout) -> Result<Self, ConfigError> {
        config.validate()?;
        let bounds = config.bounds();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let weights = WeightedIndex::new(config.terrain_weights)
            .map_err(|e| ConfigError::Invalid(format!("terrain weights: {}", e)))?;
        let terrain: Vec<Terrain> = (0..bounds.cell_count())
            .map(|_| Terrain::ALL[weights.sample(&mut rng)])
            .collect();

        let treasure = random_location(&mut rng, bounds);
        let mut animals: Vec<Animal> = (0..config.num_animals)
            .map(|_| Animal {
                location: random_location(&mut rng, bounds),
                heading: random_heading(&mut rng, config.animal_range),
            })
            .collect();
        let mut relayers: Vec<Location> = (0..config.num_relayers)
            .map(|_| random_location(&mut rng, bounds))
            .collect();
        let mut runner_starts: Vec<Location> = (0..config.num_runners)
            .map(|_| random_location(&mut rng, bounds))
            .collect();

        let treasure = layout.treasure.unwrap_or(treasure);
        if let Some(pinned) = layout.animals {
            animals = pinned
                .into_iter()
                .map(|location| Animal {
                    location,
                    heading: random_heading(&mut rng, config.animal_range),
                })
                .collect();
        }
        if let Some(pinned) = layout.relayers {
            relayers = pinned;
        }
        if let Some(pinned) = layout.runner_starts {
            runner_starts = pinned;
        }

        for &loc in std::iter::once(&treasure)
            .chain(&relayers)
            .chain(&runner_starts)
            .chain(animals.iter().map(|a| &a.location))
        {
            if !bounds.contains(loc) {
                return Err(ConfigError::Invalid(format!("pinned location {} is off the map", loc)));
            }
        }
        if relayers.len() != config.num_relayers || runner_starts.len() != config.num_runners {
            return Err(ConfigError::Invalid("layout does not match agent counts".into()));
        }

        debug!(
            "World seed {}: treasure {}, {} animals, relayers {:?}",
            seed,
            treasure,
            animals.len(),
            relayers
        );

        Ok(Self {
            bounds,
            terrain,
            treasure,
            animals,
            relayers,
            runner_starts,
            rng,
            animal_range: config.animal_range,
            direction_change_prob: config.animal_direction_change_prob,
            kill_radius: config.kill_radius,
            animal_radius: config.animal_radius,
            treasure_radius: config.treasure_radius,
            view_half: config.terrain_range / 2,
            steps: 0,
        })
    }

    /// Moves every animal one step.
    pub fn advance_animals(&mut self) {
        for i in 0..self.animals.len() {
            let animal = self.animals[i];
            self.animals[i] = self.step_animal(animal);
        }
        self.steps += 1;
    }

    fn step_animal(&mut self, animal: Animal) -> Animal {
        let mut heading = animal.heading;
        if self.rng.gen_bool(self.direction_change_prob) {
            let mut fresh = random_heading(&mut self.rng, self.animal_range);
            while fresh == heading {
                fresh = random_heading(&mut self.rng, self.animal_range);
            }
            heading = fresh;
        }

        for _ in 0..MAX_HEADING_ATTEMPTS {
            if let Some(next) = self.bounds.offset(animal.location, heading.0, heading.1) {
                return Animal {
                    location: next,
                    heading,
                };
            }
            heading = random_heading(&mut self.rng, self.animal_range);
        }
        Animal {
            location: animal.location,
            heading,
        }
    }

    fn local_view(&self, location: Location) -> LocalView {
        let terrain = self
            .bounds
            .rect_cells(location, location, self.view_half)
            .map(|cell| TerrainObservation::new(cell, self.terrain_at(cell)))
            .collect();
        let animals = self
            .animals
            .iter()
            .map(|a| a.location)
            .filter(|a| a.euclidean(location) <= self.animal_radius)
            .collect();
        let treasure = (self.treasure.euclidean(location) <= self.treasure_radius).then_some(self.treasure);
        LocalView {
            terrain,
            animals,
            treasure,
        }
    }

    pub fn terrain_at(&self, location: Location) -> Terrain {
        self.terrain[self.bounds.index(location)]
    }

    pub fn treasure(&self) -> Location {
        self.treasure
    }

    pub fn animals(&self) -> &[Animal] {
        &self.animals
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl WorldOracle for World {
    fn query(&mut self, location: Location, is_runner: bool) -> GameState {
        self.advance_animals();
        let wait_time = self.terrain_at(location).wait_time();

        if is_runner {
            if location == self.treasure {
                return GameState {
                    alive: true,
                    won: true,
                    wait_time: 0,
                    local_view: None,
                };
            }
            if self
                .animals
                .iter()
                .any(|a| a.location.euclidean(location) <= self.kill_radius)
            {
                return GameState {
                    alive: false,
                    won: false,
                    wait_time: 0,
                    local_view: None,
                };
            }
        }

        GameState {
            alive: true,
            won: false,
            wait_time,
            local_view: Some(self.local_view(location)),
        }
    }

    fn relayer_locations(&self) -> &[Location] {
        &self.relayers
    }

    fn runner_start_locations(&self) -> &[Location] {
        &self.runner_starts
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("bounds", &self.bounds)
            .field("treasure", &self.treasure)
            .field("animals", &self.animals)
            .field("relayers", &self.relayers)
            .field("steps", &self.steps)
            .finish()
    }
}

fn random_location(rng: &mut ChaCha8Rng, bounds: Bounds) -> Location {
    Location::new(rng.gen_range(0..bounds.rows), rng.gen_range(0..bounds.cols))
}

/// A non-zero step with each component in `-range..=range`.
fn random_heading(rng: &mut ChaCha8Rng, range: i64) -> (i64, i64) {
    loop {
        let heading = (rng.gen_range(-range..=range), rng.gen_range(-range..=range));
        if heading != (0, 0) {
            return heading;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quiet_config() -> GameConfig {
        GameConfig {
            num_animals: 0,
            num_relayers: 1,
            num_runners: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_seed_same_world() {
        let config = GameConfig::default();
        let mut a = World::new(&config, 42).unwrap();
        let mut b = World::new(&config, 42).unwrap();

        assert_eq!(a.treasure(), b.treasure());
        assert_eq!(a.relayer_locations(), b.relayer_locations());
        for _ in 0..20 {
            a.advance_animals();
            b.advance_animals();
        }
        assert_eq!(a.animals(), b.animals());
    }

    #[test]
    fn test_query_location_does_not_affect_motion() {
        let config = GameConfig::default();
        let mut a = World::new(&config, 7).unwrap();
        let mut b = World::new(&config, 7).unwrap();

        for i in 0..10 {
            a.query(Location::new(i, i), true);
            b.query(Location::new(0, 0), false);
        }
        assert_eq!(a.animals(), b.animals());
        assert_eq!(a.steps(), 10);
    }

    #[test]
    fn test_layout_pins_positions() {
        let config = quiet_config();
        let layout = WorldLayout {
            treasure: Some(Location::new(10, 10)),
            runner_starts: Some(vec![Location::new(10, 8)]),
            relayers: Some(vec![Location::new(12, 12)]),
            ..Default::default()
        };
        let world = World::with_layout(&config, 1, layout).unwrap();
        assert_eq!(world.treasure(), Location::new(10, 10));
        assert_eq!(world.runner_start_locations(), &[Location::new(10, 8)]);
        assert_eq!(world.relayer_locations(), &[Location::new(12, 12)]);

        // same draws as without the layout
        let plain = World::new(&config, 1).unwrap();
        assert_eq!(
            (0..100).map(|c| world.terrain_at(Location::new(3, c))).collect::<Vec<_>>(),
            (0..100).map(|c| plain.terrain_at(Location::new(3, c))).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_layout_rejects_bad_counts() {
        let config = quiet_config();
        let layout = WorldLayout {
            relayers: Some(vec![Location::new(1, 1), Location::new(2, 2)]),
            ..Default::default()
        };
        assert!(World::with_layout(&config, 1, layout).is_err());
    }

    #[test]
    fn test_runner_wins_on_treasure() {
        let config = quiet_config();
        let layout = WorldLayout {
            treasure: Some(Location::new(10, 10)),
            ..Default::default()
        };
        let mut world = World::with_layout(&config, 3, layout).unwrap();

        let state = world.query(Location::new(10, 10), true);
        assert!(state.won && state.alive);
        assert!(state.local_view.is_none());

        // relayers can stand anywhere
        let state = world.query(Location::new(10, 10), false);
        assert!(!state.won);
    }

    #[test]
    fn test_view_contents() {
        let config = quiet_config();
        let layout = WorldLayout {
            treasure: Some(Location::new(10, 10)),
            ..Default::default()
        };
        let mut world = World::with_layout(&config, 3, layout).unwrap();

        let view = world.query(Location::new(10, 8), true).local_view.unwrap();
        assert_eq!(view.treasure, Some(Location::new(10, 10)));
        assert_eq!(view.terrain.len(), 81);
        assert!(view.animals.is_empty());

        let corner = world.query(Location::new(0, 0), true).local_view.unwrap();
        assert_eq!(corner.terrain.len(), 25);
        assert_eq!(corner.treasure, None);
    }

    #[test]
    fn test_animal_kills_within_radius() {
        let config = GameConfig {
            num_animals: 1,
            num_relayers: 1,
            num_runners: 1,
            ..Default::default()
        };
        let layout = WorldLayout {
            animals: Some(vec![Location::new(50, 50)]),
            ..Default::default()
        };
        let mut world = World::with_layout(&config, 9, layout).unwrap();

        // wherever the animal steps, it lands on one of its neighbours
        let state = world.query(Location::new(50, 50), true);
        let animal = world.animals()[0].location;
        assert_eq!(animal.chebyshev(Location::new(50, 50)), 1);
        assert_eq!(state.alive, animal.euclidean(Location::new(50, 50)) > 1.0);

        let far = world.query(Location::new(0, 0), true);
        assert!(far.alive);
    }

    #[test]
    fn test_weights_respected() {
        let config = GameConfig {
            terrain_weights: [1.0, 0.0, 0.0, 0.0],
            ..quiet_config()
        };
        let world = World::new(&config, 11).unwrap();
        for row in 0..100 {
            for col in 0..100 {
                assert_eq!(world.terrain_at(Location::new(row, col)), Terrain::FlatGround);
            }
        }
    }

    proptest! {
        #[test]
        fn animals_stay_on_map(seed in any::<u64>(), steps in 1usize..200) {
            let config = GameConfig {
                map_rows: 12,
                map_cols: 9,
                num_animals: 6,
                ..Default::default()
            };
            let mut world = World::new(&config, seed).unwrap();
            for _ in 0..steps {
                world.advance_animals();
                for animal in world.animals() {
                    prop_assert!(world.bounds().contains(animal.location));
                    prop_assert!(animal.heading != (0, 0));
                }
            }
        }
    }
}
