//! Closed-form and least-squares multilateration.
//!
//! Pure functions over [`Anchor`] value types, no shared state. The
//! two-anchor path is the classic two-circle intersection
//! (<https://paulbourke.net/geometry/circlesphere/>); the general path
//! linearizes the circle equations by subtracting anchor 0's equation from
//! every other and solves the resulting system by least squares.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::core::{Anchor, Position, Solution};

const EPS: f32 = 1e-5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    /// `solve` needs at least three anchors.
    #[error("insufficient anchors: got {got}, need {need}")]
    InsufficientAnchors { got: usize, need: usize },
    /// The anchor geometry admits no intersection (or infinitely many).
    #[error("degenerate anchor geometry")]
    DegenerateGeometry,
}

fn float_equal(x: f32, y: f32, eps: f32) -> bool {
    (x - y).abs() < eps
}

/// Position on the anchor's circle at the given angle, degrees.
///
/// A last-resort estimate when only a single ranging sample exists; the
/// result is inherently degenerate (any angle fits the one distance).
pub fn solve_single_anchor(anchor: &Anchor, angle_deg: f32) -> Position {
    let angle_rad = angle_deg * (std::f32::consts::PI / 180.0);
    Position::new(
        anchor.position.x + anchor.distance * angle_rad.cos(),
        anchor.position.y + anchor.distance * angle_rad.sin(),
    )
}

/// Intersection of two ranging circles.
///
/// Returns both intersection points, or `None` when the circles are
/// separate, nested, coincident, or concentric (all geometries with no
/// single well-defined intersection pair).
pub fn solve_two_anchors(anchor0: &Anchor, anchor1: &Anchor) -> Option<(Position, Position)> {
    let dx = anchor1.position.x - anchor0.position.x;
    let dy = anchor1.position.y - anchor0.position.y;
    let dist = anchor0.position.distance_to(&anchor1.position);

    if dist > anchor0.distance + anchor1.distance {
        // circles are separate
        return None;
    }
    if dist < (anchor0.distance - anchor1.distance).abs() {
        // one circle is contained within the other
        return None;
    }
    if float_equal(dist, 0.0, EPS) && float_equal(anchor0.distance, anchor1.distance, EPS) {
        // coincident circles, infinite solutions
        return None;
    }
    if float_equal(dist, 0.0, EPS) {
        // concentric with different radii; also guards division by zero
        return None;
    }

    let a = (anchor0.distance.powi(2) - anchor1.distance.powi(2) + dist.powi(2)) / (2.0 * dist);
    let h_sq = anchor0.distance.powi(2) - a.powi(2);
    // Tangent circles can dip just below zero through rounding.
    let h = h_sq.max(0.0).sqrt();

    let x2 = anchor0.position.x + (a * dx) / dist;
    let y2 = anchor0.position.y + (a * dy) / dist;

    let first = Position::new(x2 + (h * dy) / dist, y2 - (h * dx) / dist);
    let second = Position::new(x2 - (h * dy) / dist, y2 + (h * dx) / dist);
    Some((first, second))
}

/// Least-squares multilateration over three or more anchors.
///
/// Subtracting anchor 0's circle equation from every other anchor's yields
/// the linear system `A·x = b`; the minimum-norm least-squares solution is
/// the estimate and the residual norm `|A·x − b|` is reported as `error`.
pub fn solve(anchors: &[Anchor]) -> Result<Solution, SolverError> {
    if anchors.len() < 3 {
        return Err(SolverError::InsufficientAnchors {
            got: anchors.len(),
            need: 3,
        });
    }

    let rows = anchors.len() - 1;
    let mut a = DMatrix::<f32>::zeros(rows, 2);
    let mut b = DVector::<f32>::zeros(rows);
    let a0 = &anchors[0];
    for (i, anchor) in anchors.iter().enumerate().skip(1) {
        a[(i - 1, 0)] = anchor.position.x - a0.position.x;
        a[(i - 1, 1)] = anchor.position.y - a0.position.y;
        b[i - 1] = 0.5
            * (a0.distance.powi(2) - anchor.distance.powi(2)
                + (anchor.position.x.powi(2) + anchor.position.y.powi(2))
                - (a0.position.x.powi(2) + a0.position.y.powi(2)));
    }

    let svd = a.clone().svd(true, true);
    let x = svd
        .solve(&b, EPS)
        .map_err(|_| SolverError::DegenerateGeometry)?;

    let residual = (&a * &x - &b).norm();
    Ok(Solution {
        position: Position::new(x[0], x[1]),
        error: residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(x: f32, y: f32, distance: f32) -> Anchor {
        Anchor::new(Position::new(x, y), distance)
    }

    #[test]
    fn test_single_anchor_on_circle() {
        let pos = solve_single_anchor(&anchor(1.0, 2.0, 5.0), 0.0);
        assert!((pos.x - 6.0).abs() < 1e-5);
        assert!((pos.y - 2.0).abs() < 1e-5);

        let pos = solve_single_anchor(&anchor(0.0, 0.0, 2.0), 90.0);
        assert!(pos.x.abs() < 1e-5);
        assert!((pos.y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_two_anchors_separated_circles_no_solution() {
        // anchors at (0,0,r=1) and (5,0,r=1): gap between the circles
        assert!(solve_two_anchors(&anchor(0.0, 0.0, 1.0), &anchor(5.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_two_anchors_nested_circles_no_solution() {
        assert!(solve_two_anchors(&anchor(0.0, 0.0, 5.0), &anchor(1.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_two_anchors_coincident_circles_no_solution() {
        assert!(solve_two_anchors(&anchor(0.0, 0.0, 2.0), &anchor(0.0, 0.0, 2.0)).is_none());
    }

    #[test]
    fn test_two_anchors_zero_distance_no_solution() {
        // concentric circles with distinct radii
        assert!(solve_two_anchors(&anchor(0.0, 0.0, 1.0), &anchor(0.0, 0.0, 3.0)).is_none());
    }

    #[test]
    fn test_two_anchors_intersecting() {
        // circles at (0,0) and (2,0), both r=√2: intersect at (1,±1)
        let r = 2.0_f32.sqrt();
        let (p1, p2) =
            solve_two_anchors(&anchor(0.0, 0.0, r), &anchor(2.0, 0.0, r)).expect("intersection");
        assert!((p1.x - 1.0).abs() < 1e-4);
        assert!((p2.x - 1.0).abs() < 1e-4);
        assert!((p1.y.abs() - 1.0).abs() < 1e-4);
        assert!((p1.y + p2.y).abs() < 1e-4);
    }

    #[test]
    fn test_solve_requires_three_anchors() {
        let anchors = vec![anchor(0.0, 0.0, 1.0), anchor(1.0, 0.0, 1.0)];
        assert_eq!(
            solve(&anchors),
            Err(SolverError::InsufficientAnchors { got: 2, need: 3 })
        );
        assert!(matches!(
            solve(&[]),
            Err(SolverError::InsufficientAnchors { got: 0, need: 3 })
        ));
    }

    #[test]
    fn test_solve_exact_square_reproduces_point() {
        // anchors at the corners of a 9×9 square, true position (3,3),
        // exact distances: residual must be ≈ 0
        let truth = Position::new(3.0, 3.0);
        let corners = [(0.0, 0.0), (9.0, 0.0), (0.0, 9.0), (9.0, 9.0)];
        let anchors: Vec<Anchor> = corners
            .iter()
            .map(|&(x, y)| {
                let p = Position::new(x, y);
                Anchor::new(p, p.distance_to(&truth))
            })
            .collect();
        let solution = solve(&anchors).unwrap();
        assert!((solution.position.x - truth.x).abs() < 1e-3);
        assert!((solution.position.y - truth.y).abs() < 1e-3);
        assert!(solution.error < 1e-3);
    }

    #[test]
    fn test_solve_reports_residual_for_noisy_distances() {
        let anchors = vec![
            anchor(0.0, 0.0, 5.5),
            anchor(9.0, 0.0, 6.2),
            anchor(0.0, 9.0, 7.1),
            anchor(9.0, 9.0, 8.0),
        ];
        let solution = solve(&anchors).unwrap();
        assert!(solution.error > 0.0);
    }
}
