//! Integer grid geometry: positions, cardinal directions, and the
//! canonical `"x.y"` encoding used for node identifiers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced when decoding grid coordinates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("malformed position id {0:?}: expected \"x.y\" with integer x and y")]
    MalformedId(String),
    #[error("delta ({x}, {y}) is not a unit step")]
    NotAdjacent { x: i32, y: i32 },
    #[error("{width}x{height} footprint at [{origin}] leaves the grid")]
    OutOfBounds {
        origin: Position,
        width: u32,
        height: u32,
    },
    #[error("path of {cells} cells is longer than {MAX_PATH_CELLS}")]
    PathTooLong { cells: u64 },
}

/// Upper bound on the cells [`build_path`] will lay out.
pub const MAX_PATH_CELLS: u64 = 1 << 16;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A cell on the 2D grid. `y` grows southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another position. Exact across the whole
    /// `i32` grid.
    pub fn manhattan_distance(&self, other: &Position) -> u64 {
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dy = (i64::from(self.y) - i64::from(other.y)).unsigned_abs();
        dx + dy
    }

    /// True when `other` shares an edge with this cell.
    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.manhattan_distance(other) == 1
    }

    /// The offset that takes `from` to `self`, saturating at the `i32`
    /// range. Exact for adjacent cells.
    pub fn delta_from(&self, from: &Position) -> Delta {
        Delta {
            x: self.x.saturating_sub(from.x),
            y: self.y.saturating_sub(from.y),
        }
    }

    /// `None` when the result falls off the grid.
    pub fn checked_offset(&self, delta: Delta) -> Option<Position> {
        Some(Position::new(
            self.x.checked_add(delta.x)?,
            self.y.checked_add(delta.y)?,
        ))
    }

    /// One grid step toward `target`, resolving the x axis first.
    /// Returns `self` when already there.
    pub fn step_toward(&self, target: &Position) -> Position {
        let step = |from: i32, to: i32| match to.cmp(&from) {
            Ordering::Greater => from + 1,
            Ordering::Less => from - 1,
            Ordering::Equal => from,
        };
        if self.x != target.x {
            Position::new(step(self.x, target.x), self.y)
        } else {
            Position::new(self.x, step(self.y, target.y))
        }
    }

    /// The edge-sharing neighbours on the grid, in `Direction::all()`
    /// order.
    pub fn neighbors(&self) -> impl Iterator<Item = Position> {
        let origin = *self;
        Direction::all()
            .into_iter()
            .filter_map(move |d| origin.checked_offset(d.delta()))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.x, self.y)
    }
}

impl FromStr for Position {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || GeometryError::MalformedId(s.to_string());
        let (x, y) = s.split_once('.').ok_or_else(malformed)?;
        Ok(Position::new(
            parse_coordinate(x).ok_or_else(malformed)?,
            parse_coordinate(y).ok_or_else(malformed)?,
        ))
    }
}

/// An optional leading `-` followed by one or more ASCII digits.
fn parse_coordinate(s: &str) -> Option<i32> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// Offset between two cells. Only used for display interpolation and for
/// deriving output directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Delta {
    pub x: i32,
    pub y: i32,
}

impl Delta {
    pub const ZERO: Delta = Delta { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        *self == Delta::ZERO
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four cardinal directions.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Unit offset for this direction.
    pub fn delta(&self) -> Delta {
        match self {
            Direction::North => Delta::new(0, -1),
            Direction::East => Delta::new(1, 0),
            Direction::South => Delta::new(0, 1),
            Direction::West => Delta::new(-1, 0),
        }
    }

    /// The direction pointing from `from` to the adjacent cell `to`.
    pub fn between(from: &Position, to: &Position) -> Result<Direction, GeometryError> {
        let d = to.delta_from(from);
        Direction::all()
            .into_iter()
            .find(|dir| dir.delta() == d)
            .ok_or(GeometryError::NotAdjacent { x: d.x, y: d.y })
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }
}

// ---------------------------------------------------------------------------
// Footprint
// ---------------------------------------------------------------------------

/// Width and height of a rectangular multi-cell structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub width: u32,
    pub height: u32,
}

impl Footprint {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The bottom-right cell when the top-left corner is at `origin`.
    /// Fails when any covered cell would leave the `i32` grid.
    pub fn far_corner(&self, origin: Position) -> Result<Position, GeometryError> {
        let out_of_bounds = || GeometryError::OutOfBounds {
            origin,
            width: self.width,
            height: self.height,
        };
        let span = |len: u32| i32::try_from(len.saturating_sub(1)).ok();
        let delta = Delta::new(
            span(self.width).ok_or_else(out_of_bounds)?,
            span(self.height).ok_or_else(out_of_bounds)?,
        );
        origin.checked_offset(delta).ok_or_else(out_of_bounds)
    }

    /// Every cell covered when the footprint's top-left corner is at
    /// `origin`, x outer and y inner. The origin itself comes first. Cells
    /// past the edge of the grid are not produced; check
    /// [`Footprint::far_corner`] first.
    pub fn tiles(&self, origin: Position) -> impl Iterator<Item = Position> {
        let (width, height) = (self.width, self.height);
        (0..width).flat_map(move |dx| {
            (0..height).filter_map(move |dy| {
                let delta = Delta::new(i32::try_from(dx).ok()?, i32::try_from(dy).ok()?);
                origin.checked_offset(delta)
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Conveyor paths
// ---------------------------------------------------------------------------

/// Which axis an L-shaped path walks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// Build the L-shaped chain of cells from `first` to `last` (both
/// inclusive), walking `start` first and then the other axis. Consecutive
/// cells are always adjacent.
pub fn build_path(first: Position, last: Position, start: Axis) -> Result<Vec<Position>, GeometryError> {
    let cells = first.manhattan_distance(&last) + 1;
    if cells > MAX_PATH_CELLS {
        return Err(GeometryError::PathTooLong { cells });
    }

    let corner = match start {
        Axis::X => Position::new(last.x, first.y),
        Axis::Y => Position::new(first.x, last.y),
    };
    let mut path = Vec::with_capacity(cells as usize);
    let mut at = first;
    path.push(at);
    for leg_end in [corner, last] {
        while at != leg_end {
            at = at.step_toward(&leg_end);
            path.push(at);
        }
    }
    Ok(path)
}
