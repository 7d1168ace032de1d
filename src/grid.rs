//! Grid connectivity graph.
//!
//! A level is an orthogonal grid of nodes with 4-directional adjacency.
//! Walls do not delete nodes; they detach a node from its neighbours, so the
//! coordinate stays addressable while being unreachable. Each node also owns
//! the set of entities standing on it, which is what turn resolution queries
//! when it needs "who is on this tile".

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// The four orthogonal step offsets, in fixed scan order.
pub const ORTHO_STEPS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Integer grid coordinate (x = column, y = row, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Coord {
        Coord::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(&self, other: Coord) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Squared Euclidean distance. Ordering-equivalent to the real distance,
    /// so proximity comparisons stay in exact integer arithmetic.
    pub fn dist_sq(&self, other: Coord) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

/// One grid node: its edge state and its occupants.
#[derive(Debug, Clone, Default)]
pub struct GridCell {
    /// True while the node is cut off from all four neighbours (walls, and
    /// the exit during generation validation).
    pub detached: bool,
    pub occupants: Vec<Entity>,
}

/// The level graph: node connectivity plus per-node occupant sets.
#[derive(Resource, Debug, Clone)]
pub struct GridGraph {
    width: i32,
    height: i32,
    cells: Vec<GridCell>,
}

impl GridGraph {
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "grid dimensions must be positive");
        Self {
            width,
            height,
            cells: vec![GridCell::default(); (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Flat cell index for a coordinate, or None if out of bounds.
    fn index(&self, c: Coord) -> Option<usize> {
        if self.in_bounds(c) {
            Some((c.y * self.width + c.x) as usize)
        } else {
            None
        }
    }

    pub fn in_bounds(&self, c: Coord) -> bool {
        c.x >= 0 && c.x < self.width && c.y >= 0 && c.y < self.height
    }

    /// Bounds-checked node lookup. Detached nodes are still addressable;
    /// off-grid coordinates are not.
    pub fn node_at(&self, x: i32, y: i32) -> Option<Coord> {
        let c = Coord::new(x, y);
        if self.in_bounds(c) {
            Some(c)
        } else {
            None
        }
    }

    /// Out-of-bounds coordinates count as detached.
    pub fn is_detached(&self, c: Coord) -> bool {
        match self.index(c) {
            Some(i) => self.cells[i].detached,
            None => true,
        }
    }

    /// Cut each listed node off from its neighbours.
    pub fn detach(&mut self, nodes: &[Coord]) {
        for &c in nodes {
            if let Some(i) = self.index(c) {
                self.cells[i].detached = true;
            }
        }
    }

    /// Reconnect a node to whichever neighbours are themselves attached.
    pub fn reattach(&mut self, node: Coord) {
        if let Some(i) = self.index(node) {
            self.cells[i].detached = false;
        }
    }

    /// True when `a` and `b` are orthogonally adjacent and the edge between
    /// them is intact (neither endpoint detached).
    pub fn is_connected(&self, a: Coord, b: Coord) -> bool {
        a.manhattan(b) == 1 && !self.is_detached(a) && !self.is_detached(b)
    }

    /// Attached orthogonal neighbours reachable from `c` in one step.
    /// A detached node has no neighbours.
    pub fn neighbors(&self, c: Coord) -> Vec<Coord> {
        if self.is_detached(c) {
            return Vec::new();
        }
        ORTHO_STEPS
            .iter()
            .map(|&(dx, dy)| c.offset(dx, dy))
            .filter(|&n| self.in_bounds(n) && !self.is_detached(n))
            .collect()
    }

    // ========================================================================
    // OCCUPANCY
    // ========================================================================

    pub fn occupants(&self, c: Coord) -> &[Entity] {
        match self.index(c) {
            Some(i) => &self.cells[i].occupants,
            None => &[],
        }
    }

    pub fn place(&mut self, entity: Entity, c: Coord) {
        if let Some(i) = self.index(c) {
            self.cells[i].occupants.push(entity);
        }
    }

    pub fn remove(&mut self, entity: Entity, c: Coord) {
        if let Some(i) = self.index(c) {
            self.cells[i].occupants.retain(|&o| o != entity);
        }
    }

    pub fn relocate(&mut self, entity: Entity, from: Coord, to: Coord) {
        self.remove(entity, from);
        self.place(entity, to);
    }

    pub fn clear_occupants(&mut self) {
        for cell in &mut self.cells {
            cell.occupants.clear();
        }
    }

    // ========================================================================
    // REACHABILITY
    // ========================================================================

    /// Flood-fill from `from`, refusing to enter nodes for which `blocked`
    /// holds, and report whether every attached, unblocked node was visited.
    /// Used to validate that a generated level is fully traversable.
    pub fn is_fully_reachable(&self, from: Coord, blocked: impl Fn(Coord) -> bool) -> bool {
        let start = match self.index(from) {
            Some(i) => i,
            None => return false,
        };
        if self.cells[start].detached || blocked(from) {
            return false;
        }

        let target = (0..self.cells.len())
            .filter(|&i| {
                let c = Coord::new(i as i32 % self.width, i as i32 / self.width);
                !self.cells[i].detached && !blocked(c)
            })
            .count();

        let mut visited = vec![false; self.cells.len()];
        visited[start] = true;
        let mut seen = 1usize;
        let mut stack = vec![from];
        while let Some(c) = stack.pop() {
            for n in self.neighbors(c) {
                let i = match self.index(n) {
                    Some(i) => i,
                    None => continue,
                };
                if !visited[i] && !blocked(n) {
                    visited[i] = true;
                    seen += 1;
                    stack.push(n);
                }
            }
        }
        seen == target
    }

    /// A* shortest path over intact edges, Manhattan heuristic, unit step
    /// cost. The returned path includes both endpoints; None if unreachable.
    pub fn shortest_path(&self, from: Coord, to: Coord) -> Option<Vec<Coord>> {
        if self.is_detached(from) || self.is_detached(to) {
            return None;
        }
        if from == to {
            return Some(vec![from]);
        }

        let mut open = BinaryHeap::new();
        let mut came_from: HashMap<Coord, Coord> = HashMap::new();
        let mut g_scores: HashMap<Coord, i32> = HashMap::new();

        g_scores.insert(from, 0);
        open.push(PathNode {
            coord: from,
            f_cost: from.manhattan(to),
        });

        while let Some(PathNode { coord, .. }) = open.pop() {
            if coord == to {
                return Some(reconstruct_path(&came_from, coord));
            }
            let g = g_scores.get(&coord).copied().unwrap_or(i32::MAX);
            for n in self.neighbors(coord) {
                let tentative = g + 1;
                if tentative < g_scores.get(&n).copied().unwrap_or(i32::MAX) {
                    g_scores.insert(n, tentative);
                    came_from.insert(n, coord);
                    open.push(PathNode {
                        coord: n,
                        f_cost: tentative + n.manhattan(to),
                    });
                }
            }
        }
        None
    }
}

/// Open-set entry ordered so the binary heap pops the lowest f-cost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PathNode {
    coord: Coord,
    f_cost: i32,
}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other.f_cost.cmp(&self.f_cost)
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn reconstruct_path(came_from: &HashMap<Coord, Coord>, end: Coord) -> Vec<Coord> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        current = prev;
        path.push(current);
    }
    path.reverse();
    path
}
