//! Geometric value types consumed by the solvers.

use serde::{Deserialize, Serialize};

/// 2-D position in the local planar frame, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Planar distance to another position.
    pub fn distance_to(&self, other: &Position) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A station with a known position and a measured distance to the mobile
/// node. Immutable per solve call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub position: Position,
    pub distance: f32,
}

impl Anchor {
    pub fn new(position: Position, distance: f32) -> Self {
        Self { position, distance }
    }
}

/// A solved position together with the least-squares residual norm.
/// Produced fresh by each solver call, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    pub position: Position,
    pub error: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_between_positions() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
        assert!((b.distance_to(&a) - 5.0).abs() < 1e-6);
    }
}
