//! Grid position on a map.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A tile coordinate. `z` distinguishes stacked map layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Layer.
    #[serde(default)]
    pub z: i32,
}

impl Position {
    /// Create a position on layer zero.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y, z: 0 }
    }

    /// Chebyshev (king-move) distance on the x/y plane.
    pub const fn distance(&self, other: &Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy { dx } else { dy }
    }

    /// Signed offset from `self` to `other`.
    pub const fn delta_to(&self, other: &Self) -> (i32, i32) {
        (
            other.x.saturating_sub(self.x),
            other.y.saturating_sub(self.y),
        )
    }

    /// The position shifted by `(dx, dy)`.
    #[must_use]
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            z: self.z,
        }
    }

    /// One king-move step from `self` toward `target`.
    #[must_use]
    pub const fn step_toward(&self, target: &Self) -> Self {
        let (dx, dy) = self.delta_to(target);
        self.offset(dx.signum(), dy.signum())
    }
}
