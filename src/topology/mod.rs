//! Graph-based position refinement.
//!
//! An alternative estimator to the closed-form solvers: the local node and
//! every station with a usable position become graph nodes, distances become
//! preferred edge lengths, and a force-directed layout relaxes the local
//! node into the most consistent spot.

mod graph;
mod layout;
mod refiner;

pub use graph::{DistanceGraph, GraphNode};
pub use layout::{LayoutEngine, SpringLayout};
pub use refiner::{GraphRefiner, PassState, RefineError, RefineOutcome, StationObservation};
