//! Grid primitives: locations, bounds and terrain.

use serde::{Deserialize, Serialize};

/// A cell on the map, addressed as `(row, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// L∞ distance: the number of unobstructed 8-directional steps.
    pub fn chebyshev(&self, other: Location) -> usize {
        self.row.abs_diff(other.row).max(self.col.abs_diff(other.col))
    }

    /// Straight-line distance.
    pub fn euclidean(&self, other: Location) -> f64 {
        let dr = self.row.abs_diff(other.row) as f64;
        let dc = self.col.abs_diff(other.col) as f64;
        (dr * dr + dc * dc).sqrt()
    }
}

/// Renders as a tuple literal, which is also the wire syntax: `(3, 4)`.
impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

impl From<(usize, usize)> for Location {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// Map dimensions plus the index arithmetic every grid-backed store needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub rows: usize,
    pub cols: usize,
}

impl Bounds {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn contains(&self, loc: Location) -> bool {
        loc.row < self.rows && loc.col < self.cols
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Row-major index of `loc`. Callers must check [`Bounds::contains`].
    pub fn index(&self, loc: Location) -> usize {
        loc.row * self.cols + loc.col
    }

    pub fn location(&self, index: usize) -> Location {
        Location::new(index / self.cols, index % self.cols)
    }

    /// Largest Chebyshev distance between two cells of this map.
    pub fn max_radius(&self) -> usize {
        self.rows.max(self.cols).saturating_sub(1)
    }

    /// Applies a signed offset, returning `None` off the map.
    pub fn offset(&self, loc: Location, d_row: i64, d_col: i64) -> Option<Location> {
        let row = loc.row as i64 + d_row;
        let col = loc.col as i64 + d_col;
        if row < 0 || col < 0 {
            return None;
        }
        let moved = Location::new(row as usize, col as usize);
        self.contains(moved).then_some(moved)
    }

    /// The up-to-8 cells adjacent to `loc`.
    pub fn neighbors(&self, loc: Location) -> impl Iterator<Item = Location> + '_ {
        const STEPS: [(i64, i64); 8] = [
            (-1, -1), (-1, 0), (-1, 1),
            (0, -1),           (0, 1),
            (1, -1),  (1, 0),  (1, 1),
        ];
        STEPS
            .iter()
            .filter_map(move |&(dr, dc)| self.offset(loc, dr, dc))
    }

    /// All cells within Euclidean `radius` of `center`, row-major.
    pub fn cells_within(&self, center: Location, radius: f64) -> Vec<Location> {
        let reach = radius.max(0.0).floor() as usize;
        let (r0, r1) = self.clamp_span(center.row, reach, self.rows);
        let (c0, c1) = self.clamp_span(center.col, reach, self.cols);
        let mut cells = Vec::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                let cell = Location::new(row, col);
                if cell.euclidean(center) <= radius {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    /// Cells of the axis-aligned box spanning `a` and `b`, grown by `margin`.
    pub fn rect_cells(&self, a: Location, b: Location, margin: usize) -> impl Iterator<Item = Location> {
        let r0 = a.row.min(b.row).saturating_sub(margin);
        let r1 = a.row.max(b.row).saturating_add(margin).min(self.rows - 1);
        let c0 = a.col.min(b.col).saturating_sub(margin);
        let c1 = a.col.max(b.col).saturating_add(margin).min(self.cols - 1);
        (r0..=r1).flat_map(move |row| (c0..=c1).map(move |col| Location::new(row, col)))
    }

    fn clamp_span(&self, center: usize, reach: usize, len: usize) -> (usize, usize) {
        (center.saturating_sub(reach), center.saturating_add(reach).min(len - 1))
    }
}

/// Ground types. The discriminant is the wire ordinal; higher ordinals are
/// slower to cross and are preferred when a message has to be truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Terrain {
    FlatGround = 0,
    Rocks = 1,
    Mud = 2,
    Quicksand = 3,
}

impl Terrain {
    pub const ALL: [Terrain; 4] = [
        Terrain::FlatGround,
        Terrain::Rocks,
        Terrain::Mud,
        Terrain::Quicksand,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Ticks a runner must wait after stepping onto this terrain.
    pub fn wait_time(self) -> u32 {
        match self {
            Terrain::FlatGround => 0,
            Terrain::Rocks => 1,
            Terrain::Mud => 3,
            Terrain::Quicksand => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distances() {
        let a = Location::new(2, 3);
        let b = Location::new(5, 4);
        assert_eq!(a.chebyshev(b), 3);
        assert!((a.euclidean(b) - 10f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_neighbors_clip_to_map() {
        let bounds = Bounds::new(10, 10);
        assert_eq!(bounds.neighbors(Location::new(0, 0)).count(), 3);
        assert_eq!(bounds.neighbors(Location::new(0, 5)).count(), 5);
        assert_eq!(bounds.neighbors(Location::new(5, 5)).count(), 8);
    }

    #[test]
    fn test_cells_within_radius_two() {
        let bounds = Bounds::new(100, 100);
        let cells = bounds.cells_within(Location::new(50, 50), 2.0);
        // 5 + 3 + 3 + 1 + 1 cells with dr^2 + dc^2 <= 4
        assert_eq!(cells.len(), 13);
        assert!(cells.contains(&Location::new(48, 50)));
        assert!(!cells.contains(&Location::new(48, 49)));

        let corner = bounds.cells_within(Location::new(0, 0), 2.0);
        assert_eq!(corner.len(), 6);
    }

    #[test]
    fn test_huge_radius_covers_map() {
        let bounds = Bounds::new(4, 4);
        assert_eq!(bounds.cells_within(Location::new(3, 3), 1e300).len(), 16);
        assert_eq!(bounds.cells_within(Location::new(1, 2), f64::INFINITY).len(), 16);
        assert_eq!(bounds.rect_cells(Location::new(3, 3), Location::new(0, 0), usize::MAX).count(), 16);
    }

    #[test]
    fn test_rect_cells_clipped() {
        let bounds = Bounds::new(10, 10);
        let cells: Vec<_> = bounds
            .rect_cells(Location::new(0, 0), Location::new(1, 2), 1)
            .collect();
        assert_eq!(cells.len(), 3 * 4);
    }

    #[test]
    fn test_terrain_ordinals() {
        for terrain in Terrain::ALL {
            assert_eq!(Terrain::from_ordinal(terrain.ordinal()), Some(terrain));
        }
        assert_eq!(Terrain::from_ordinal(4), None);
        assert!(Terrain::Quicksand > Terrain::Mud);
        assert_eq!(Terrain::Quicksand.wait_time(), 10);
    }

    #[test]
    fn test_location_display_is_tuple_literal() {
        assert_eq!(Location::new(10, 8).to_string(), "(10, 8)");
    }
}
