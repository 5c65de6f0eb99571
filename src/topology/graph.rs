//! Distance graph rebuilt fresh for every refinement pass.

use std::collections::HashMap;

use crate::core::Position;

/// A node is a device with a working position; pinned nodes are never moved
/// by the layout engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphNode {
    pub position: Position,
    pub pinned: bool,
}

/// Undirected graph of devices and preferred inter-device distances.
///
/// Edges are keyed by the unordered node pair; inserting `(a, b)` and
/// `(b, a)` addresses the same edge. A negative length is a repulsive hint
/// rather than a target distance.
#[derive(Debug, Default)]
pub struct DistanceGraph {
    nodes: HashMap<u32, GraphNode>,
    edges: HashMap<u64, f32>,
}

fn edge_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    (u64::from(hi) << 32) | u64::from(lo)
}

impl DistanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: u32, position: Position, pinned: bool) {
        self.nodes.insert(id, GraphNode { position, pinned });
    }

    /// Set the preferred length of the edge between `a` and `b`. Self-edges
    /// are ignored.
    pub fn set_edge(&mut self, a: u32, b: u32, length: f32) {
        if a == b {
            return;
        }
        self.edges.insert(edge_key(a, b), length);
    }

    pub fn node(&self, id: u32) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn set_position(&mut self, id: u32, position: Position) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.position = position;
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes.keys().copied()
    }

    /// Edges as `(a, b, length)` with `a < b`.
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32, f32)> + '_ {
        self.edges.iter().map(|(&key, &length)| {
            let lo = (key & 0xffff_ffff) as u32;
            let hi = (key >> 32) as u32;
            (lo, hi, length)
        })
    }
}
