//! Map geometry queries.
//!
//! Tile layout and field of view belong to the map collaborator. The
//! simulation only asks three questions of it, through [`Geometry`]:
//! whether a tile is a wall, whether a character can see an offset from
//! where it stands, and how far apart two tiles are.

use std::collections::BTreeSet;
use std::fmt;

use rair_types::Position;

use crate::config::MapConfig;

/// Pure map queries used by spawners, NPC AI, and command validation.
pub trait Geometry: Send + Sync + fmt::Debug {
    /// Whether `pos` is impassable.
    fn is_wall(&self, pos: Position) -> bool;

    /// Whether a character at `from` can see the tile `(dx, dy)` away.
    fn can_see(&self, from: Position, dx: i32, dy: i32) -> bool;

    /// Tile distance between two positions.
    fn distance(&self, a: Position, b: Position) -> u32 {
        a.distance(&b)
    }
}

/// Open ground: no walls, sight limited only by radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenField {
    sight_radius: u32,
}

impl OpenField {
    /// Open ground with the given sight radius.
    pub const fn new(sight_radius: u32) -> Self {
        Self { sight_radius }
    }
}

impl Geometry for OpenField {
    fn is_wall(&self, _pos: Position) -> bool {
        false
    }

    fn can_see(&self, _from: Position, dx: i32, dy: i32) -> bool {
        dx.unsigned_abs().max(dy.unsigned_abs()) <= self.sight_radius
    }
}

/// A set of wall tiles. Walls block movement and line of sight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallGrid {
    walls: BTreeSet<Position>,
    sight_radius: u32,
}

impl WallGrid {
    /// A grid with the given walls.
    pub fn new(walls: impl IntoIterator<Item = Position>, sight_radius: u32) -> Self {
        Self {
            walls: walls.into_iter().collect(),
            sight_radius,
        }
    }
}

impl Geometry for WallGrid {
    fn is_wall(&self, pos: Position) -> bool {
        self.walls.contains(&pos)
    }

    fn can_see(&self, from: Position, dx: i32, dy: i32) -> bool {
        if dx.unsigned_abs().max(dy.unsigned_abs()) > self.sight_radius {
            return false;
        }
        let target = from.offset(dx, dy);
        let mut cursor = from;
        // Walk king-moves toward the target; any wall strictly between the
        // two tiles blocks the view.
        for _ in 0..self.sight_radius {
            cursor = cursor.step_toward(&target);
            if cursor == target {
                return true;
            }
            if self.is_wall(cursor) {
                return false;
            }
        }
        cursor == target
    }
}

/// Geometry for a configured map.
pub fn for_map(map: &MapConfig) -> Box<dyn Geometry> {
    if map.walls.is_empty() {
        Box::new(OpenField::new(map.sight_radius))
    } else {
        Box::new(WallGrid::new(map.walls.iter().copied(), map.sight_radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_field_sees_within_radius() {
        let g = OpenField::new(4);
        let origin = Position::new(0, 0);
        assert!(g.can_see(origin, 4, -3));
        assert!(!g.can_see(origin, 5, 0));
        assert!(!g.is_wall(origin));
    }

    #[test]
    fn wall_blocks_sight_but_not_adjacent_view() {
        let g = WallGrid::new([Position::new(1, 0)], 8);
        let origin = Position::new(0, 0);
        assert!(g.can_see(origin, 1, 0));
        assert!(!g.can_see(origin, 3, 0));
        assert!(g.can_see(origin, 0, 3));
    }

    #[test]
    fn distance_defaults_to_chebyshev() {
        let g = OpenField::new(8);
        assert_eq!(g.distance(Position::new(0, 0), Position::new(2, -6)), 6);
    }

    #[test]
    fn map_without_walls_is_open() {
        let map = MapConfig::named("plain");
        let g = for_map(&map);
        assert!(g.can_see(Position::new(0, 0), 8, 8));
        assert!(!g.is_wall(Position::new(3, 3)));
    }
}
