use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod environment;
pub mod map;
pub mod search;
pub mod selector;
pub mod simulation;

/// Identifier printed on a task cell and recorded when the agent completes it.
pub type TaskId = u32;

/// Represents a 2D coordinate.
///
/// Ordering is by `x`, then `y`. Open tasks are visited in this order, which
/// makes it the tie-break between equally near tasks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Returns the position shifted by `(dx, dy)`, or `None` if either
    /// coordinate would go negative.
    pub fn offset(self, dx: isize, dy: isize) -> Option<Position> {
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }

    /// True if `other` is exactly one orthogonal step away.
    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) == 1
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
