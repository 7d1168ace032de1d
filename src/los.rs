//! Discretized line of sight.
//!
//! Shots travel along an integer Bresenham line from the shooter toward a
//! target node. The trace stops at the first node holding a space-occupying
//! entity, and that node is included, so the caller can tell what was hit.
//! The same trace, side-effect free, backs the targeting laser preview.

use bevy_ecs::prelude::*;

use crate::components::{IsPlayer, OccupiesSpace};
use crate::grid::{Coord, GridGraph};

/// Every integer point on the segment from `from` to `to`, both endpoints
/// included, ordered from `from` outward. Works in all octants.
pub fn bresenham_line(from: Coord, to: Coord) -> Vec<Coord> {
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;
    let mut x = from.x;
    let mut y = from.y;

    let mut points = Vec::with_capacity((dx - dy) as usize + 1);
    loop {
        points.push(Coord::new(x, y));
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// Nodes a shot fired at `from` toward `target` passes through: the
/// shooter's own node is excluded, off-grid points end the trace, and the
/// first node with a space-occupying occupant other than the player ends the
/// trace inclusively.
pub fn shot_path(world: &World, grid: &GridGraph, from: Coord, target: Coord) -> Vec<Coord> {
    let mut path = Vec::new();
    if from == target {
        return path;
    }
    for point in bresenham_line(from, target).into_iter().skip(1) {
        if !grid.in_bounds(point) {
            break;
        }
        path.push(point);
        let blocked = grid.occupants(point).iter().any(|&e| {
            world.get::<OccupiesSpace>(e).is_some() && world.get::<IsPlayer>(e).is_none()
        });
        if blocked {
            break;
        }
    }
    path
}
