//! Game configuration shared by every agent.
//!
//! One immutable [`GameConfig`] is built at startup (defaults, optionally
//! overridden from a JSON file) and handed to every component explicitly.
//! All processes of one run must use the same configuration and seed.

use crate::grid::Bounds;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`GameConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Grid rows (default: 100)
    pub map_rows: usize,

    /// Grid columns (default: 100)
    pub map_cols: usize,

    /// Number of relayer processes
    pub num_relayers: usize,

    /// Number of runner processes
    pub num_runners: usize,

    /// Number of animals roaming the map
    pub num_animals: usize,

    /// Distance within which an agent sees animals
    pub animal_radius: f64,

    /// Distance within which an animal kills a runner
    pub kill_radius: f64,

    /// Side length of the terrain window an agent observes
    pub terrain_range: usize,

    /// Distance within which the treasure is detected (also the radius
    /// marked as checked around every reported runner position)
    pub treasure_radius: f64,

    /// Maximum per-axis animal step
    pub animal_range: i64,

    /// Probability that an animal changes heading on a given tick
    pub animal_direction_change_prob: f64,

    /// Distance within which a runner can talk to a relayer
    pub comm_radius: f64,

    /// Generation weights indexed by terrain ordinal
    pub terrain_weights: [f64; 4],

    /// Byte budget of a runner-to-relayer message
    pub runner_message_limit: usize,

    /// Byte budget of a relayer-to-relayer / relayer-to-runner message
    pub relayer_message_limit: usize,

    /// Byte budget of a relayer-to-sink summary
    pub sink_message_limit: usize,

    /// Smallest Chebyshev ring searched for frontier targets
    pub frontier_min_radius: usize,

    /// Extra cost of entering a cell near a believed animal (0: off)
    pub hazard_penalty: u64,

    /// Host every agent binds/dials
    pub host: String,

    /// Base TCP port; see the `*_addr` helpers for the layout
    pub port_start: u16,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            map_rows: 100,
            map_cols: 100,
            num_relayers: 2,
            num_runners: 4,
            num_animals: 5,
            animal_radius: 10.0,
            kill_radius: 1.0,
            terrain_range: 8,
            treasure_radius: 2.0,
            animal_range: 1,
            animal_direction_change_prob: 0.15,
            comm_radius: 30.0,
            terrain_weights: [0.55, 0.25, 0.15, 0.05],
            runner_message_limit: 32,
            relayer_message_limit: 128,
            sink_message_limit: 8092,
            frontier_min_radius: 1,
            hazard_penalty: 0,
            host: "127.0.0.1".to_string(),
            port_start: 50000,
        }
    }
}

impl GameConfig {
    /// Returns the map bounds.
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.map_rows, self.map_cols)
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_rows == 0 || self.map_cols == 0 {
            return Err(ConfigError::Invalid("map must have at least one cell".into()));
        }
        if self.num_relayers == 0 {
            return Err(ConfigError::Invalid("at least one relayer is required".into()));
        }
        if self.num_runners == 0 {
            return Err(ConfigError::Invalid("at least one runner is required".into()));
        }
        if self.terrain_weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(ConfigError::Invalid("terrain weights must be finite and non-negative".into()));
        }
        if (self.terrain_weights.iter().sum::<f64>() - 1.0).abs() > 1e-8 {
            return Err(ConfigError::Invalid("terrain weights must sum to 1".into()));
        }
        let radii = [
            ("animal_radius", self.animal_radius),
            ("kill_radius", self.kill_radius),
            ("treasure_radius", self.treasure_radius),
            ("comm_radius", self.comm_radius),
        ];
        for (name, radius) in radii {
            if !radius.is_finite() || radius < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be finite and non-negative",
                    name
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.animal_direction_change_prob) {
            return Err(ConfigError::Invalid("direction change probability must be in [0, 1]".into()));
        }
        if self.animal_range < 1 {
            return Err(ConfigError::Invalid("animal range must be at least 1".into()));
        }
        if self.frontier_min_radius == 0 {
            return Err(ConfigError::Invalid("frontier minimum radius must be at least 1".into()));
        }
        let relayer_ports = 2 * self.num_relayers;
        if usize::from(self.port_start) < 2 || usize::from(self.port_start) + relayer_ports > 65536 {
            return Err(ConfigError::Invalid("port range does not fit".into()));
        }
        Ok(())
    }

    /// Address of the visualization sink.
    pub fn sink_addr(&self) -> String {
        format!("{}:{}", self.host, self.port_start - 1)
    }

    /// Address the spawner listens on for "I'm up" notifications.
    pub fn spawner_addr(&self) -> String {
        format!("{}:{}", self.host, self.port_start - 2)
    }

    /// Address where relayer `id` accepts runners.
    pub fn relayer_runner_addr(&self, id: u32) -> String {
        format!("{}:{}", self.host, usize::from(self.port_start) + id as usize)
    }

    /// Address where relayer `id` accepts higher-numbered relayers.
    pub fn relayer_peer_addr(&self, id: u32) -> String {
        format!(
            "{}:{}",
            self.host,
            usize::from(self.port_start) + self.num_relayers + id as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GameConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.runner_message_limit, 32);
        assert_eq!(config.relayer_message_limit, 128);
    }

    #[test]
    fn test_port_layout() {
        let config = GameConfig::default();
        assert_eq!(config.sink_addr(), "127.0.0.1:49999");
        assert_eq!(config.spawner_addr(), "127.0.0.1:49998");
        assert_eq!(config.relayer_runner_addr(1), "127.0.0.1:50001");
        assert_eq!(config.relayer_peer_addr(0), "127.0.0.1:50002");
        assert_eq!(config.relayer_peer_addr(1), "127.0.0.1:50003");
    }

    #[test]
    fn test_bad_weights_rejected() {
        let config = GameConfig {
            terrain_weights: [0.5, 0.5, 0.5, 0.0],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_radii_rejected() {
        for config in [
            GameConfig {
                treasure_radius: f64::INFINITY,
                ..Default::default()
            },
            GameConfig {
                kill_radius: -1.0,
                ..Default::default()
            },
            GameConfig {
                comm_radius: f64::NAN,
                ..Default::default()
            },
        ] {
            assert!(config.validate().is_err());
        }

        // finite but huge is allowed; grid helpers clamp it
        let huge = GameConfig {
            animal_radius: 1e300,
            ..Default::default()
        };
        assert_eq!(huge.validate(), Ok(()));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GameConfig =
            serde_json::from_str(r#"{"map_rows": 20, "map_cols": 30, "num_runners": 1}"#).unwrap();
        assert_eq!(config.bounds(), Bounds::new(20, 30));
        assert_eq!(config.num_runners, 1);
        assert_eq!(config.num_relayers, 2);
    }
}
