//! Force-directed layout over a [`DistanceGraph`].

use std::collections::HashMap;

use rand::Rng;

use crate::core::Position;
use crate::topology::graph::DistanceGraph;

/// The layout boundary. Engines move only unpinned nodes and must observe
/// the iteration bound.
pub trait LayoutEngine: Send + Sync {
    fn layout(&self, graph: &mut DistanceGraph, max_iters: usize);
}

/// Spring relaxation: each edge pulls or pushes its endpoints toward the
/// preferred length. A negative length is repulsive only, acting when the
/// endpoints are closer than its magnitude.
pub struct SpringLayout {
    /// Fraction of the length error applied per iteration.
    step: f32,
    /// Largest per-node displacement that still counts as converged.
    tolerance: f32,
}

impl Default for SpringLayout {
    fn default() -> Self {
        Self {
            step: 0.3,
            tolerance: 1e-3,
        }
    }
}

impl SpringLayout {
    pub fn new(step: f32, tolerance: f32) -> Self {
        Self { step, tolerance }
    }
}

impl LayoutEngine for SpringLayout {
    fn layout(&self, graph: &mut DistanceGraph, max_iters: usize) {
        let mut rng = rand::thread_rng();
        for _ in 0..max_iters {
            let mut forces: HashMap<u32, (f32, f32)> = HashMap::new();
            for (a, b, length) in graph.edges() {
                let (Some(na), Some(nb)) = (graph.node(a), graph.node(b)) else {
                    continue;
                };
                let mut dx = nb.position.x - na.position.x;
                let mut dy = nb.position.y - na.position.y;
                let mut dist = (dx * dx + dy * dy).sqrt();
                if dist < 1e-6 {
                    // coincident endpoints, separate in a random direction
                    let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
                    dx = angle.cos() * 1e-3;
                    dy = angle.sin() * 1e-3;
                    dist = 1e-3;
                }
                let error = if length >= 0.0 {
                    dist - length
                } else if dist < -length {
                    dist - (-length)
                } else {
                    // repulsive hint satisfied, no force
                    continue;
                };
                let scale = self.step * error / dist;
                let fx = dx * scale;
                let fy = dy * scale;
                if !na.pinned {
                    let entry = forces.entry(a).or_insert((0.0, 0.0));
                    entry.0 += fx;
                    entry.1 += fy;
                }
                if !nb.pinned {
                    let entry = forces.entry(b).or_insert((0.0, 0.0));
                    entry.0 -= fx;
                    entry.1 -= fy;
                }
            }

            let mut max_move = 0.0_f32;
            for (id, (fx, fy)) in forces {
                if let Some(node) = graph.node(id) {
                    let next = Position::new(node.position.x + fx, node.position.y + fy);
                    max_move = max_move.max((fx * fx + fy * fy).sqrt());
                    graph.set_position(id, next);
                }
            }
            if max_move < self.tolerance {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_nodes_never_move() {
        let mut graph = DistanceGraph::new();
        graph.add_node(1, Position::new(0.0, 0.0), true);
        graph.add_node(2, Position::new(10.0, 0.0), true);
        graph.set_edge(1, 2, 3.0);
        SpringLayout::default().layout(&mut graph, 100);
        assert_eq!(graph.node(1).unwrap().position, Position::new(0.0, 0.0));
        assert_eq!(graph.node(2).unwrap().position, Position::new(10.0, 0.0));
    }

    #[test]
    fn test_edge_relaxes_toward_preferred_length() {
        let mut graph = DistanceGraph::new();
        graph.add_node(1, Position::new(0.0, 0.0), true);
        graph.add_node(2, Position::new(10.0, 0.0), false);
        graph.set_edge(1, 2, 4.0);
        SpringLayout::default().layout(&mut graph, 500);
        let moved = graph.node(2).unwrap().position;
        let dist = Position::new(0.0, 0.0).distance_to(&moved);
        assert!((dist - 4.0).abs() < 0.05, "ended at distance {dist}");
    }

    #[test]
    fn test_two_pinned_anchors_pull_node_between_them() {
        let mut graph = DistanceGraph::new();
        graph.add_node(1, Position::new(0.0, 0.0), true);
        graph.add_node(2, Position::new(10.0, 0.0), true);
        graph.add_node(3, Position::new(2.0, 5.0), false);
        graph.set_edge(1, 3, 5.0);
        graph.set_edge(2, 3, 5.0);
        SpringLayout::default().layout(&mut graph, 500);
        let moved = graph.node(3).unwrap().position;
        assert!((moved.x - 5.0).abs() < 0.2, "ended at {moved:?}");
    }

    #[test]
    fn test_negative_length_only_repels() {
        // already farther apart than the hint magnitude: no movement
        let mut graph = DistanceGraph::new();
        graph.add_node(1, Position::new(0.0, 0.0), true);
        graph.add_node(2, Position::new(8.0, 0.0), false);
        graph.set_edge(1, 2, -5.0);
        SpringLayout::default().layout(&mut graph, 100);
        assert_eq!(graph.node(2).unwrap().position, Position::new(8.0, 0.0));

        // closer than the hint magnitude: pushed out to it
        let mut graph = DistanceGraph::new();
        graph.add_node(1, Position::new(0.0, 0.0), true);
        graph.add_node(2, Position::new(1.0, 0.0), false);
        graph.set_edge(1, 2, -5.0);
        SpringLayout::default().layout(&mut graph, 500);
        let dist = graph.node(2).unwrap().position.x;
        assert!(dist > 4.9, "ended at x = {dist}");
    }

    #[test]
    fn test_no_edges_means_no_movement() {
        let mut graph = DistanceGraph::new();
        graph.add_node(1, Position::new(3.0, 4.0), false);
        SpringLayout::default().layout(&mut graph, 100);
        assert_eq!(graph.node(1).unwrap().position, Position::new(3.0, 4.0));
    }
}
