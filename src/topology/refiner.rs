//! Refinement pass over the distance graph.
//!
//! Every pass builds a fresh graph, relaxes it, saves the local node's
//! position back as a location and drops the graph. Stations with a known
//! location are pinned; the local node is the only one expected to move.

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::constants::{EDGE_LENGTH_CLAMP, LAYOUT_SCALE};
use crate::core::location::{LocalLocation, UNCERTAINTY_UNKNOWN};
use crate::core::Position;
use crate::topology::graph::DistanceGraph;
use crate::topology::layout::{LayoutEngine, SpringLayout};
use crate::utils::config::TopologyConfig;

/// What the refiner knows about one station when a pass begins.
#[derive(Debug, Clone, Copy)]
pub struct StationObservation {
    pub id: u32,
    pub location: LocalLocation,
    /// Most recent filtered ranging result toward this station, if any.
    pub distance_cm: Option<u32>,
}

impl StationObservation {
    fn has_location(&self) -> bool {
        self.location.uncertainty < UNCERTAINTY_UNKNOWN
    }
}

/// Phase of the refinement pass. Every completed pass walks the full cycle
/// and ends back at `Idle` with the graph freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    GraphOpen,
    Populated,
    LaidOut,
    PositionSaved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation} called in pass state {state:?}")]
pub struct RefineError {
    pub operation: &'static str,
    pub state: PassState,
}

/// Result of one completed pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOutcome {
    pub location: LocalLocation,
    /// How far the local node moved, in layout units.
    pub displacement: f32,
}

pub struct GraphRefiner {
    engine: Box<dyn LayoutEngine>,
    max_iters_per_step: usize,
    local_id: u32,
    state: PassState,
    graph: Option<DistanceGraph>,
    start: Option<Position>,
    template: LocalLocation,
}

/// Location units to layout units.
pub fn location_to_pos(location: &LocalLocation) -> Position {
    Position::new(
        f32::from(location.north) * LAYOUT_SCALE,
        f32::from(location.east) * LAYOUT_SCALE,
    )
}

/// Layout units back to location units; altitude and floor are carried over
/// from `template` since the layout is planar.
pub fn pos_to_location(pos: &Position, template: &LocalLocation) -> LocalLocation {
    LocalLocation {
        north: (pos.x / LAYOUT_SCALE).round() as i16,
        east: (pos.y / LAYOUT_SCALE).round() as i16,
        altitude: template.altitude,
        floor: template.floor,
        uncertainty: template.uncertainty,
    }
}

impl GraphRefiner {
    pub fn new(engine: Box<dyn LayoutEngine>, max_iters_per_step: usize, local_id: u32) -> Self {
        Self {
            engine,
            max_iters_per_step,
            local_id,
            state: PassState::Idle,
            graph: None,
            start: None,
            template: LocalLocation::default(),
        }
    }

    /// Build a refiner from the topology config section. The mode hint picks
    /// the layout engine; an unrecognized mode falls back to the spring
    /// engine.
    pub fn from_config(config: &TopologyConfig, local_id: u32) -> Self {
        let engine: Box<dyn LayoutEngine> = match config.mode.as_str() {
            "sgd" | "spring" => Box::new(SpringLayout::default()),
            other => {
                warn!(mode = other, "unknown layout mode, using spring engine");
                Box::new(SpringLayout::default())
            }
        };
        Self::new(engine, usize::from(config.max_iters_per_step), local_id)
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    fn expect_state(&self, operation: &'static str, expected: PassState) -> Result<(), RefineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RefineError {
                operation,
                state: self.state,
            })
        }
    }

    /// Open a fresh graph holding only the local node.
    pub fn begin_pass(&mut self, local: &LocalLocation) -> Result<(), RefineError> {
        self.expect_state("begin_pass", PassState::Idle)?;
        let mut graph = DistanceGraph::new();
        let start = if local.uncertainty < UNCERTAINTY_UNKNOWN {
            location_to_pos(local)
        } else {
            jittered_seed()
        };
        graph.add_node(self.local_id, start, false);
        self.graph = Some(graph);
        self.start = Some(start);
        self.template = *local;
        self.state = PassState::GraphOpen;
        Ok(())
    }

    /// Add station nodes and edges.
    ///
    /// Stations with a fresh distance get a measured edge to the local node,
    /// length in meters. Stations without one but with a known location get
    /// geometric fallback edges toward every measured node, lengths in
    /// layout units clamped to the allowed range. Stations with neither a
    /// distance nor a location are skipped.
    pub fn populate(&mut self, stations: &[StationObservation]) -> Result<(), RefineError> {
        self.expect_state("populate", PassState::GraphOpen)?;
        let graph = self.graph.as_mut().unwrap();

        let mut measured: Vec<&StationObservation> = Vec::new();
        let mut unreachable: Vec<&StationObservation> = Vec::new();
        for station in stations {
            match station.distance_cm {
                Some(_) => measured.push(station),
                None if station.has_location() => unreachable.push(station),
                None => {
                    debug!(station = station.id, "skipping station with no distance and no location");
                }
            }
        }

        for station in &measured {
            let (pos, pinned) = if station.has_location() {
                (location_to_pos(&station.location), true)
            } else {
                (jittered_seed(), false)
            };
            graph.add_node(station.id, pos, pinned);
            let length_m = station.distance_cm.unwrap() as f32 / 100.0;
            graph.set_edge(self.local_id, station.id, length_m);
        }

        for station in &unreachable {
            graph.add_node(station.id, location_to_pos(&station.location), true);
            let station_pos = location_to_pos(&station.location);
            let mut peers: Vec<(u32, Position)> = Vec::new();
            if self.template.uncertainty < UNCERTAINTY_UNKNOWN {
                peers.push((self.local_id, location_to_pos(&self.template)));
            }
            for other in &measured {
                if other.has_location() {
                    peers.push((other.id, location_to_pos(&other.location)));
                }
            }
            for (peer_id, peer_pos) in peers {
                let length = station_pos
                    .distance_to(&peer_pos)
                    .clamp(-EDGE_LENGTH_CLAMP, EDGE_LENGTH_CLAMP);
                graph.set_edge(peer_id, station.id, length);
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph populated"
        );
        self.state = PassState::Populated;
        Ok(())
    }

    /// Relax the graph with the configured engine.
    pub fn run_layout(&mut self) -> Result<(), RefineError> {
        self.expect_state("run_layout", PassState::Populated)?;
        let graph = self.graph.as_mut().unwrap();
        if graph.edge_count() == 0 {
            warn!("layout pass with no edges, nothing will move");
        }
        self.engine.layout(graph, self.max_iters_per_step);
        self.state = PassState::LaidOut;
        Ok(())
    }

    /// Read the local node's relaxed position back as a location. The
    /// uncertainty is the displacement from the pass start, in location
    /// units.
    pub fn save_position(&mut self) -> Result<RefineOutcome, RefineError> {
        self.expect_state("save_position", PassState::LaidOut)?;
        let graph = self.graph.as_ref().unwrap();
        let end = graph
            .node(self.local_id)
            .map(|node| node.position)
            .unwrap_or_else(|| self.start.unwrap());
        let displacement = self.start.unwrap().distance_to(&end);
        let mut location = pos_to_location(&end, &self.template);
        location.uncertainty = ((displacement / LAYOUT_SCALE).round() as u32)
            .min(u32::from(UNCERTAINTY_UNKNOWN - 1)) as u16;
        self.state = PassState::PositionSaved;
        Ok(RefineOutcome {
            location,
            displacement,
        })
    }

    /// Free the graph and return to idle.
    pub fn finish_pass(&mut self) -> Result<(), RefineError> {
        self.expect_state("finish_pass", PassState::PositionSaved)?;
        self.graph = None;
        self.start = None;
        self.state = PassState::Idle;
        Ok(())
    }

    /// One full refinement pass.
    pub fn run_pass(
        &mut self,
        local: &LocalLocation,
        stations: &[StationObservation],
    ) -> Result<RefineOutcome, RefineError> {
        self.begin_pass(local)?;
        self.populate(stations)?;
        self.run_layout()?;
        let outcome = self.save_position()?;
        self.finish_pass()?;
        Ok(outcome)
    }
}

fn jittered_seed() -> Position {
    let mut rng = rand::thread_rng();
    Position::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
}
