//! Grid Model
//!
//! Coordinates, secret cells and the fleet rules a committed grid must obey.
//!
//! Ships never touch, not even diagonally, so two occupied cells that are
//! 8-adjacent always belong to the same ship. Every fleet check below is
//! built on that: cluster occupied cells by 8-adjacency, then reason about
//! the clusters.

use std::fmt;
use rand::Rng;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::hash::{Hash, CommitHasher};

/// Board edge length.
pub const GRID_SIZE: u8 = 10;

/// Number of cells on the board.
pub const CELL_COUNT: usize = 100;

/// Ship lengths, largest first.
pub const FLEET: [usize; 5] = [5, 4, 3, 3, 2];

/// Total number of occupied cells in a legal grid.
pub const FLEET_CELLS: u8 = 17;

/// Attempts per ship before a random placement restarts from scratch.
const PLACEMENT_ATTEMPTS: usize = 200;

// =============================================================================
// COORDINATE
// =============================================================================

/// Grid coordinate, `0 <= x, y < 10`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
}

impl Coordinate {
    /// Create a coordinate (not range checked).
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Coordinate for a cell index, if the index is on the board.
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= CELL_COUNT {
            return None;
        }
        let size = GRID_SIZE as usize;
        Some(Self::new((index % size) as u8, (index / size) as u8))
    }

    /// Cell index `y * 10 + x`.
    #[inline]
    pub fn to_index(&self) -> usize {
        self.y as usize * GRID_SIZE as usize + self.x as usize
    }

    /// Whether the coordinate lies on the board.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x < GRID_SIZE && self.y < GRID_SIZE
    }

    /// Whether two distinct coordinates are 8-adjacent.
    pub fn touches(&self, other: &Coordinate) -> bool {
        let dx = (self.x as i16 - other.x as i16).abs();
        let dy = (self.y as i16 - other.y as i16).abs();
        dx <= 1 && dy <= 1 && (dx, dy) != (0, 0)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// CELL
// =============================================================================

/// A single secret cell: random salt plus occupancy flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Random salt preventing brute force of the leaf.
    pub salt: [u8; 32],
    /// Whether a ship occupies this cell.
    pub occupied: bool,
}

impl Cell {
    /// Create a cell.
    pub const fn new(salt: [u8; 32], occupied: bool) -> Self {
        Self { salt, occupied }
    }

    /// Create a cell with a fresh random salt.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, occupied: bool) -> Self {
        Self::new(rng.gen(), occupied)
    }

    /// Leaf preimage: `salt ∥ occupied_byte` (33 bytes).
    pub fn leaf_bytes(&self) -> [u8; 33] {
        let mut leaf = [0u8; 33];
        leaf[..32].copy_from_slice(&self.salt);
        leaf[32] = self.occupied as u8;
        leaf
    }

    /// Leaf hash `H(salt ∥ occupied_byte)`.
    pub fn leaf_hash(&self) -> Hash {
        let mut hasher = CommitHasher::new();
        hasher.update_bytes(&self.salt);
        hasher.update_bool(self.occupied);
        hasher.finalize()
    }
}

// =============================================================================
// SHIPS
// =============================================================================

/// Ship orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Extends towards +x.
    Horizontal,
    /// Extends towards +y.
    Vertical,
}

/// A ship placement used when building a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    /// Top-left cell.
    pub origin: Coordinate,
    /// Number of cells.
    pub length: usize,
    /// Direction the ship extends in.
    pub orientation: Orientation,
}

impl Ship {
    /// Create a ship placement.
    pub const fn new(origin: Coordinate, length: usize, orientation: Orientation) -> Self {
        Self { origin, length, orientation }
    }

    /// Cells covered by the ship, or None if it leaves the board.
    pub fn cells(&self) -> Option<Vec<Coordinate>> {
        (0..self.length)
            .map(|offset| {
                let offset = u8::try_from(offset).ok()?;
                let (x, y) = match self.orientation {
                    Orientation::Horizontal => (self.origin.x.checked_add(offset)?, self.origin.y),
                    Orientation::Vertical => (self.origin.x, self.origin.y.checked_add(offset)?),
                };
                let coord = Coordinate::new(x, y);
                coord.is_valid().then_some(coord)
            })
            .collect()
    }

    /// The ship's cells, if it can be added without overlapping or touching
    /// already occupied cells.
    fn fits(&self, occupied: &[bool; CELL_COUNT]) -> Option<Vec<Coordinate>> {
        let cells = self.cells()?;
        let clear = cells.iter().all(|cell| {
            !occupied[cell.to_index()]
                && neighbours(cell).all(|n| !occupied[n.to_index()])
        });
        clear.then_some(cells)
    }
}

/// On-board 8-neighbours of a coordinate.
fn neighbours(coord: &Coordinate) -> impl Iterator<Item = Coordinate> + '_ {
    (-1i16..=1)
        .flat_map(|dy| (-1i16..=1).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| (dx, dy) != (0, 0))
        .filter_map(move |(dx, dy)| {
            let x = u8::try_from(coord.x as i16 + dx).ok()?;
            let y = u8::try_from(coord.y as i16 + dy).ok()?;
            let n = Coordinate::new(x, y);
            n.is_valid().then_some(n)
        })
}

// =============================================================================
// FLEET RULES
// =============================================================================

/// Why a set of cells is not a legal fleet.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FleetError {
    /// Grid does not have exactly 100 cells.
    #[error("grid has {0} cells, expected 100")]
    WrongCellCount(usize),

    /// Grid does not have exactly 17 occupied cells.
    #[error("grid has {0} occupied cells, expected 17")]
    WrongOccupiedCount(usize),

    /// A cluster of touching cells is not a straight run.
    #[error("ship containing {0} is not a straight line")]
    NotStraight(Coordinate),

    /// Runs do not match the fleet lengths.
    #[error("ship lengths {0:?} do not match the fleet")]
    WrongShipSizes(Vec<usize>),

    /// A ship placement leaves the board.
    #[error("ship does not fit on the board")]
    OffBoard,

    /// Two ship placements overlap or touch.
    #[error("ships overlap or touch")]
    Overlap,
}

/// Validate a full reveal: 100 cells, 17 occupied, five straight runs of
/// lengths {5,4,3,3,2}, no two ships touching.
pub fn validate_fleet(cells: &[Cell]) -> Result<(), FleetError> {
    if cells.len() != CELL_COUNT {
        return Err(FleetError::WrongCellCount(cells.len()));
    }

    let occupied: Vec<Coordinate> = cells.iter()
        .enumerate()
        .filter(|(_, cell)| cell.occupied)
        .filter_map(|(index, _)| Coordinate::from_index(index))
        .collect();

    if occupied.len() != FLEET_CELLS as usize {
        return Err(FleetError::WrongOccupiedCount(occupied.len()));
    }

    let clusters = clusters(&occupied);
    for cluster in &clusters {
        if !is_straight(cluster) {
            return Err(FleetError::NotStraight(cluster[0]));
        }
    }

    let mut sizes: Vec<usize> = clusters.iter().map(Vec::len).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));

    if sizes != FLEET {
        return Err(FleetError::WrongShipSizes(sizes));
    }

    Ok(())
}

/// Whether the hits revealed so far on one board can still belong to a
/// legal fleet.
///
/// Only reports impossibility. A ship may be hit in several separated
/// places, so clusters are not ships; but a cluster always lies inside one
/// ship, and two clusters of length 3 or more can never share a ship.
pub fn validate_hit_pattern(hits: &[Coordinate]) -> bool {
    if hits.len() > FLEET_CELLS as usize {
        return false;
    }

    let mut long_runs = Vec::new();
    for cluster in clusters(hits) {
        if cluster.len() > FLEET[0] || !is_straight(&cluster) {
            return false;
        }
        if cluster.len() >= 3 {
            long_runs.push(cluster.len());
        }
    }

    long_runs.sort_unstable_by(|a, b| b.cmp(a));
    long_runs.len() <= FLEET.len()
        && long_runs.iter().zip(FLEET.iter()).all(|(run, ship)| run <= ship)
}

/// Group coordinates into 8-connected clusters.
fn clusters(coords: &[Coordinate]) -> Vec<Vec<Coordinate>> {
    let mut visited = vec![false; coords.len()];
    let mut clusters = Vec::new();

    for start in 0..coords.len() {
        if visited[start] {
            continue;
        }

        let mut cluster = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;

        while let Some(idx) = stack.pop() {
            cluster.push(coords[idx]);
            for (j, other) in coords.iter().enumerate() {
                if !visited[j] && coords[idx].touches(other) {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }

        clusters.push(cluster);
    }

    clusters
}

/// A cluster is a straight run if it shares a row or a column. Connected
/// cells in one row or column are necessarily contiguous.
fn is_straight(cluster: &[Coordinate]) -> bool {
    let Some(first) = cluster.first() else {
        return true;
    };
    cluster.iter().all(|c| c.x == first.x) || cluster.iter().all(|c| c.y == first.y)
}

// =============================================================================
// GRID
// =============================================================================

/// A player's secret board: 100 cells in CellIndex order.
///
/// Structural only: a grid always has 100 cells, but may still break the
/// fleet rules. Call [`Grid::validate`] to check those.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Cell>", into = "Vec<Cell>")]
pub struct Grid {
    cells: Vec<Cell>,
}

impl TryFrom<Vec<Cell>> for Grid {
    type Error = FleetError;

    fn try_from(cells: Vec<Cell>) -> Result<Self, Self::Error> {
        Self::from_cells(cells)
    }
}

impl From<Grid> for Vec<Cell> {
    fn from(grid: Grid) -> Self {
        grid.cells
    }
}

impl Grid {
    /// Wrap exactly 100 cells.
    pub fn from_cells(cells: Vec<Cell>) -> Result<Self, FleetError> {
        if cells.len() != CELL_COUNT {
            return Err(FleetError::WrongCellCount(cells.len()));
        }
        Ok(Self { cells })
    }

    /// Build a grid from an occupancy map, salting every cell.
    pub fn from_occupancy<R: Rng + ?Sized>(occupied: &[bool; CELL_COUNT], rng: &mut R) -> Self {
        let cells = occupied.iter().map(|&o| Cell::random(rng, o)).collect();
        Self { cells }
    }

    /// Build a legal grid from explicit ship placements.
    pub fn from_ships<R: Rng + ?Sized>(ships: &[Ship], rng: &mut R) -> Result<Self, FleetError> {
        let mut occupied = [false; CELL_COUNT];
        for ship in ships {
            let cells = ship.cells().ok_or(FleetError::OffBoard)?;
            for cell in cells {
                let slot = &mut occupied[cell.to_index()];
                if *slot {
                    return Err(FleetError::Overlap);
                }
                *slot = true;
            }
        }

        let grid = Self::from_occupancy(&occupied, rng);
        grid.validate()?;
        Ok(grid)
    }

    /// Random legal fleet placement.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            if let Some(occupied) = random_occupancy(rng) {
                return Self::from_occupancy(&occupied, rng);
            }
        }
    }

    /// Check the fleet rules.
    pub fn validate(&self) -> Result<(), FleetError> {
        validate_fleet(&self.cells)
    }

    /// All cells in CellIndex order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cell at a coordinate.
    pub fn cell(&self, coord: Coordinate) -> Option<&Cell> {
        if coord.is_valid() {
            self.cells.get(coord.to_index())
        } else {
            None
        }
    }

    /// Mutable cell access (lets tests build dishonest boards).
    pub fn cell_mut(&mut self, coord: Coordinate) -> Option<&mut Cell> {
        if coord.is_valid() {
            self.cells.get_mut(coord.to_index())
        } else {
            None
        }
    }

    /// Coordinates of every occupied cell.
    pub fn occupied(&self) -> Vec<Coordinate> {
        self.cells.iter()
            .enumerate()
            .filter(|(_, c)| c.occupied)
            .filter_map(|(i, _)| Coordinate::from_index(i))
            .collect()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(GRID_SIZE as usize) {
            let line: String = row.iter()
                .map(|c| if c.occupied { '#' } else { '.' })
                .collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// One attempt at placing the whole fleet; None if a ship found no room.
fn random_occupancy<R: Rng + ?Sized>(rng: &mut R) -> Option<[bool; CELL_COUNT]> {
    let mut occupied = [false; CELL_COUNT];

    for &length in FLEET.iter() {
        let cells = (0..PLACEMENT_ATTEMPTS).find_map(|_| {
            let orientation = if rng.gen_bool(0.5) {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let origin = Coordinate::new(rng.gen_range(0..GRID_SIZE), rng.gen_range(0..GRID_SIZE));
            Ship::new(origin, length, orientation).fits(&occupied)
        })?;

        for cell in cells {
            occupied[cell.to_index()] = true;
        }
    }

    Some(occupied)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Hand-placed legal fleet used across the crate's tests.
    pub(crate) fn standard_ships() -> Vec<Ship> {
        vec![
            Ship::new(Coordinate::new(0, 0), 5, Orientation::Horizontal),
            Ship::new(Coordinate::new(0, 2), 4, Orientation::Horizontal),
            Ship::new(Coordinate::new(0, 4), 3, Orientation::Horizontal),
            Ship::new(Coordinate::new(0, 6), 3, Orientation::Horizontal),
            Ship::new(Coordinate::new(0, 8), 2, Orientation::Horizontal),
        ]
    }

    pub(crate) fn standard_grid(seed: u64) -> Grid {
        let mut rng = StdRng::seed_from_u64(seed);
        Grid::from_ships(&standard_ships(), &mut rng).unwrap()
    }

    #[test]
    fn test_coordinate_index_roundtrip() {
        for index in 0..CELL_COUNT {
            let coord = Coordinate::from_index(index).unwrap();
            assert!(coord.is_valid());
            assert_eq!(coord.to_index(), index);
        }
        assert!(Coordinate::from_index(CELL_COUNT).is_none());
        assert_eq!(Coordinate::new(3, 7).to_index(), 73);
    }

    #[test]
    fn test_touches_includes_diagonals() {
        let c = Coordinate::new(4, 4);
        assert!(c.touches(&Coordinate::new(5, 5)));
        assert!(c.touches(&Coordinate::new(4, 3)));
        assert!(!c.touches(&c));
        assert!(!c.touches(&Coordinate::new(6, 4)));
    }

    #[test]
    fn test_leaf_hash_matches_leaf_bytes() {
        let cell = Cell::new([9; 32], true);
        assert_eq!(cell.leaf_hash(), crate::core::hash::hash_bytes(&cell.leaf_bytes()));
    }

    #[test]
    fn test_standard_grid_is_legal() {
        let grid = standard_grid(1);
        assert_eq!(grid.occupied().len(), FLEET_CELLS as usize);
        assert!(grid.validate().is_ok());
    }

    #[test]
    fn test_deserialize_checks_cell_count() {
        let grid = standard_grid(5);
        let json = serde_json::to_string(&grid).unwrap();
        assert_eq!(serde_json::from_str::<Grid>(&json).unwrap(), grid);

        let short: Vec<Cell> = grid.cells()[..99].to_vec();
        let json = serde_json::to_string(&short).unwrap();
        assert!(serde_json::from_str::<Grid>(&json).is_err());
    }

    #[test]
    fn test_random_grids_are_legal() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let grid = Grid::random(&mut rng);
            assert_eq!(grid.validate(), Ok(()));
        }
    }

    #[test]
    fn test_touching_ships_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ships = standard_ships();
        // Destroyer moved diagonally against the cruiser at row 6.
        ships[4] = Ship::new(Coordinate::new(3, 7), 2, Orientation::Horizontal);
        assert!(matches!(
            Grid::from_ships(&ships, &mut rng),
            Err(FleetError::NotStraight(_))
        ));
    }

    #[test]
    fn test_end_to_end_ships_rejected() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut ships = standard_ships();
        // Destroyer appended to the end of the carrier's row.
        ships[4] = Ship::new(Coordinate::new(5, 0), 2, Orientation::Horizontal);
        assert!(matches!(
            Grid::from_ships(&ships, &mut rng),
            Err(FleetError::WrongShipSizes(_))
        ));
    }

    #[test]
    fn test_overlap_and_off_board() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut ships = standard_ships();
        ships[4] = Ship::new(Coordinate::new(9, 9), 2, Orientation::Horizontal);
        assert_eq!(Grid::from_ships(&ships, &mut rng), Err(FleetError::OffBoard));

        ships[4] = Ship::new(Coordinate::new(1, 0), 2, Orientation::Vertical);
        assert_eq!(Grid::from_ships(&ships, &mut rng), Err(FleetError::Overlap));
    }

    #[test]
    fn test_wrong_occupied_count() {
        let mut grid = standard_grid(6);
        grid.cell_mut(Coordinate::new(9, 9)).unwrap().occupied = true;
        assert_eq!(grid.validate(), Err(FleetError::WrongOccupiedCount(18)));
    }

    #[test]
    fn test_wrong_cell_count() {
        assert_eq!(
            Grid::from_cells(vec![Cell::new([0; 32], false); 99]),
            Err(FleetError::WrongCellCount(99))
        );
    }

    #[test]
    fn test_hit_pattern_accepts_partial_honest_hits() {
        // Carrier hit at both ends and the middle: three separate clusters.
        let hits = vec![
            Coordinate::new(0, 0),
            Coordinate::new(2, 0),
            Coordinate::new(4, 0),
            Coordinate::new(0, 2),
            Coordinate::new(3, 2),
            Coordinate::new(0, 4),
            Coordinate::new(0, 6),
        ];
        assert!(validate_hit_pattern(&hits));
        assert!(validate_hit_pattern(&[]));
    }

    #[test]
    fn test_hit_pattern_rejects_bent_cluster() {
        let hits = vec![Coordinate::new(0, 0), Coordinate::new(1, 1)];
        assert!(!validate_hit_pattern(&hits));
    }

    #[test]
    fn test_hit_pattern_rejects_too_many_long_runs() {
        // Three separate runs of four: only the carrier and battleship fit.
        let hits: Vec<Coordinate> = [0u8, 2, 4]
            .iter()
            .flat_map(|&y| (0..4).map(move |x| Coordinate::new(x, y)))
            .collect();
        assert!(!validate_hit_pattern(&hits));
    }

    #[test]
    fn test_hit_pattern_rejects_overlong_run() {
        let hits: Vec<Coordinate> = (0..6).map(|x| Coordinate::new(x, 0)).collect();
        assert!(!validate_hit_pattern(&hits));
    }

    #[test]
    fn test_grid_display() {
        let rendered = standard_grid(7).to_string();
        assert!(rendered.starts_with("#####....."));
        assert_eq!(rendered.lines().count(), 10);
    }
}
