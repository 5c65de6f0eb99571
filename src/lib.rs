//! Indoor mesh localization core.
//!
//! A set of fixed station nodes and a mobile node cooperatively estimate the
//! mobile node's 2-D position from round-trip radio ranging, refined either by
//! closed-form multilateration or by a force-directed distance graph, and
//! exchange results with the peer radio module over a line-oriented serial
//! field protocol.

pub mod core;
pub mod ranging;
pub mod mlat;
pub mod topology;
pub mod serial;
pub mod device;
pub mod orchestrator;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{Anchor, LocalLocation, Position, Rgb, Solution};
pub use ranging::{DistancePoint, RangingError, RangingEvent, RangingResult, RangingStore};
pub use mlat::{solve, solve_single_anchor, solve_two_anchors, SolverError};
pub use topology::{DistanceGraph, GraphRefiner, LayoutEngine, SpringLayout};
pub use serial::{FieldName, SerialClient, SerialRequest, SerialResponse, SerialServer, TransportError};
pub use device::{AddressStore, Device, DeviceDirectory, DeviceKind, DirectoryError};
pub use orchestrator::{
    GraphLocalization, Localization, MlatLocalization, Orchestrator, OrchestratorEvent, SolvePath,
};
pub use utils::clock::{Clock, ManualClock, SystemClock, Ticks};
pub use utils::config::SystemConfig;
