//! JSON exporter for game replays.
//!
//! The sink records one [`TickFrame`] per completed tick: ground truth from
//! its own copy of the world next to what the relayers collectively believe.

use adelphon_core::{Location, Summary, Terrain, TerrainObservation};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// One tick of a game as the sink saw it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickFrame {
    /// Tick number, starting at 1
    pub tick: u64,

    /// Ground truth animal positions
    pub animals: Vec<Location>,

    /// Treasure, once any relayer has reported it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treasure: Option<Location>,

    /// Runner positions heard by relayers this tick
    pub runners: Vec<Location>,

    /// Animals believed by relayers this tick
    pub believed_animals: Vec<Location>,

    /// Cells revealed for the first time this tick
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub revealed: Vec<TerrainCell>,

    /// Cells known so far
    pub known_cells: usize,
}

impl TickFrame {
    /// Starts a frame from the union of this tick's relayer summaries.
    pub fn from_summaries(tick: u64, summaries: &[Summary]) -> Self {
        let mut runners: Vec<Location> = summaries
            .iter()
            .flat_map(|s| s.runners.iter().copied())
            .collect();
        runners.sort();
        runners.dedup();

        let mut believed_animals: Vec<Location> = summaries
            .iter()
            .flat_map(|s| s.animals.iter().copied())
            .collect();
        believed_animals.sort();
        believed_animals.dedup();

        Self {
            tick,
            animals: Vec::new(),
            treasure: summaries.iter().find_map(|s| s.treasure),
            runners,
            believed_animals,
            revealed: Vec::new(),
            known_cells: 0,
        }
    }
}

/// A terrain cell in export form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainCell {
    pub row: usize,
    pub col: usize,
    pub terrain: Terrain,
}

impl From<TerrainObservation> for TerrainCell {
    fn from(obs: TerrainObservation) -> Self {
        Self {
            row: obs.location.row,
            col: obs.location.col,
            terrain: obs.terrain,
        }
    }
}

/// Complete game export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameExport {
    /// Seed the world was built from
    pub seed: u64,

    pub map_rows: usize,
    pub map_cols: usize,

    /// Ground truth treasure
    pub treasure: Location,

    /// All frames
    pub frames: Vec<TickFrame>,

    /// Whether the treasure was reported before the game ended
    pub treasure_found: bool,
}

impl GameExport {
    /// Creates a new export container.
    pub fn new(seed: u64, map_rows: usize, map_cols: usize, treasure: Location) -> Self {
        Self {
            seed,
            map_rows,
            map_cols,
            treasure,
            frames: Vec::new(),
            treasure_found: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: TickFrame) {
        self.frames.push(frame);
    }

    /// Number of recorded ticks.
    pub fn ticks(&self) -> usize {
        self.frames.len()
    }

    /// Finalizes the export.
    pub fn finalize(&mut self) {
        self.treasure_found = self.frames.iter().any(|f| f.treasure.is_some());
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(relayer_id: u32, runners: Vec<Location>, treasure: Option<Location>) -> Summary {
        Summary {
            relayer_id,
            treasure,
            animals: vec![Location::new(5, 5)],
            terrain: Vec::new(),
            runners,
        }
    }

    #[test]
    fn test_frame_unions_summaries() {
        let summaries = vec![
            summary(0, vec![Location::new(1, 1), Location::new(2, 2)], None),
            summary(1, vec![Location::new(2, 2)], Some(Location::new(9, 9))),
        ];
        let frame = TickFrame::from_summaries(3, &summaries);

        assert_eq!(frame.tick, 3);
        assert_eq!(frame.runners, vec![Location::new(1, 1), Location::new(2, 2)]);
        assert_eq!(frame.believed_animals, vec![Location::new(5, 5)]);
        assert_eq!(frame.treasure, Some(Location::new(9, 9)));
    }

    #[test]
    fn test_finalize_and_write() {
        let mut export = GameExport::new(7, 10, 10, Location::new(4, 4));
        export.add_frame(TickFrame::from_summaries(1, &[summary(0, vec![], None)]));
        export.add_frame(TickFrame::from_summaries(
            2,
            &[summary(0, vec![], Some(Location::new(4, 4)))],
        ));
        export.finalize();
        assert_eq!(export.ticks(), 2);
        assert!(export.treasure_found);

        let path = std::env::temp_dir().join(format!("adelphon_export_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();
        export.write_to_file(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        let parsed: GameExport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seed, 7);
        assert_eq!(parsed.frames.len(), 2);
        assert_eq!(parsed.frames[1].treasure, Some(Location::new(4, 4)));
        std::fs::remove_file(&path).unwrap();
    }
}
