//! Periodic update loop tying ranging, estimation and the field transport
//! together.
//!
//! Estimation strategies are passive: the orchestrator owns the only update
//! thread and drives whichever strategy the current operating level selects.
//! All event producers push onto channels; the orchestrator is the consumer
//! and forwards to subscribers with an out-of-order guard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::constants::CLOSEST_ANCHORS_LIMIT;
use crate::core::location::{LocalLocation, UNCERTAINTY_UNKNOWN};
use crate::core::{Anchor, Position, Rgb};
use crate::device::DeviceDirectory;
use crate::mlat;
use crate::ranging::{RangingEvent, RangingStore};
use crate::topology::{GraphRefiner, StationObservation};
use crate::utils::clock::{Clock, Ticks};
use crate::utils::config::{OrchestratorConfig, TopologyConfig};

/// Location units per meter in the estimation plane.
const POS_SCALE: f32 = 100.0;

/// An estimation strategy the orchestrator can drive.
pub trait Localization: Send + Sync {
    /// One estimation pass; reads the directory, publishes the result.
    fn tick(&self, now: Ticks);
}

/// Which solver a tick will use, decided purely by how many usable anchors
/// are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePath {
    /// Three or more anchors, least-squares multilateration.
    Full,
    /// Exactly two, circle intersection.
    TwoCircle,
    /// One anchor pins only the distance, not the direction.
    SingleAnchor,
    /// Nothing usable; no estimate is published.
    None,
}

impl SolvePath {
    pub fn for_anchor_count(count: usize) -> Self {
        match count {
            0 => Self::None,
            1 => Self::SingleAnchor,
            2 => Self::TwoCircle,
            _ => Self::Full,
        }
    }
}

fn location_to_position(location: &LocalLocation) -> Position {
    Position::new(
        f32::from(location.north) / POS_SCALE,
        f32::from(location.east) / POS_SCALE,
    )
}

fn position_to_location(position: &Position, uncertainty: u16) -> LocalLocation {
    LocalLocation {
        north: (position.x * POS_SCALE).round() as i16,
        east: (position.y * POS_SCALE).round() as i16,
        altitude: 0,
        floor: 0,
        uncertainty,
    }
}

fn uncertainty_from_meters(meters: f32) -> u16 {
    let units = (meters.abs() * POS_SCALE).round();
    if units >= f32::from(UNCERTAINTY_UNKNOWN - 1) {
        UNCERTAINTY_UNKNOWN - 1
    } else {
        units as u16
    }
}

/// Multilateration strategy: turn every station with a known position and a
/// fresh distance into an anchor and solve for the local position.
pub struct MlatLocalization {
    directory: Arc<DeviceDirectory>,
    local_id: u32,
}

impl MlatLocalization {
    pub fn new(directory: Arc<DeviceDirectory>, local_id: u32) -> Self {
        Self {
            directory,
            local_id,
        }
    }

    /// Usable anchors, closest first, at most [`CLOSEST_ANCHORS_LIMIT`].
    /// Closer distances are generally more accurate.
    fn collect_anchors(&self) -> Vec<Anchor> {
        let mut anchors = Vec::new();
        for id in self.directory.station_ids() {
            let location = match self.directory.get_location(id) {
                Ok(location) => location,
                Err(err) => {
                    debug!(station = id, %err, "skip, no location");
                    continue;
                }
            };
            if location.uncertainty >= UNCERTAINTY_UNKNOWN / 2 {
                debug!(station = id, "skip, high uncertainty");
                continue;
            }
            let entry = match self.directory.last_distance(id) {
                Ok(Some(entry)) => entry,
                _ => {
                    debug!(station = id, "skip, no distance");
                    continue;
                }
            };
            anchors.push(Anchor::new(
                location_to_position(&location),
                entry.result.distance_cm as f32 / 100.0,
            ));
        }
        anchors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        anchors.truncate(CLOSEST_ANCHORS_LIMIT);
        anchors
    }

    /// Solve with the widest path the anchors allow, falling back one path
    /// at a time when geometry defeats the wider one.
    fn estimate(anchors: &[Anchor]) -> Option<LocalLocation> {
        if anchors.len() >= 3 {
            match mlat::solve(anchors) {
                Ok(solution) => {
                    return Some(position_to_location(
                        &solution.position,
                        uncertainty_from_meters(solution.error),
                    ));
                }
                Err(err) => debug!(%err, "full solve failed, falling back"),
            }
        }
        if anchors.len() >= 2 {
            if let Some((first, second)) = mlat::solve_two_anchors(&anchors[0], &anchors[1]) {
                let spread = first.distance_to(&second);
                return Some(position_to_location(&first, uncertainty_from_meters(spread)));
            }
            debug!("two-circle solve has no solution, falling back");
        }
        if !anchors.is_empty() {
            let position = mlat::solve_single_anchor(&anchors[0], 0.0);
            return Some(position_to_location(&position, 0));
        }
        None
    }
}

impl Localization for MlatLocalization {
    fn tick(&self, _now: Ticks) {
        match self.directory.device(self.local_id) {
            Ok(device) if device.fixed_location => return,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "local device missing, skipping estimation");
                return;
            }
        }
        let anchors = self.collect_anchors();
        let path = SolvePath::for_anchor_count(anchors.len());
        debug!(anchors = anchors.len(), ?path, "estimation tick");
        match Self::estimate(&anchors) {
            Some(location) => {
                if let Err(err) = self.directory.set_location(self.local_id, &location) {
                    warn!(%err, "could not publish estimated location");
                }
            }
            None => debug!("no anchors, keeping previous location"),
        }
    }
}

/// Graph refinement strategy: one [`GraphRefiner`] pass per tick.
pub struct GraphLocalization {
    directory: Arc<DeviceDirectory>,
    refiner: Mutex<GraphRefiner>,
    local_id: u32,
}

impl GraphLocalization {
    pub fn new(directory: Arc<DeviceDirectory>, refiner: GraphRefiner, local_id: u32) -> Self {
        Self {
            directory,
            refiner: Mutex::new(refiner),
            local_id,
        }
    }

    /// Build the strategy with a refiner configured from the topology
    /// section.
    pub fn from_config(
        directory: Arc<DeviceDirectory>,
        config: &TopologyConfig,
        local_id: u32,
    ) -> Self {
        let refiner = GraphRefiner::from_config(config, local_id);
        Self::new(directory, refiner, local_id)
    }
}

impl Localization for GraphLocalization {
    fn tick(&self, _now: Ticks) {
        match self.directory.device(self.local_id) {
            Ok(device) if device.fixed_location => return,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "local device missing, skipping refinement");
                return;
            }
        }
        let local = self
            .directory
            .get_location(self.local_id)
            .unwrap_or_default();
        let mut stations = Vec::new();
        for id in self.directory.station_ids() {
            let location = self.directory.get_location(id).unwrap_or_default();
            let distance_cm = self
                .directory
                .last_distance(id)
                .ok()
                .flatten()
                .map(|entry| entry.result.distance_cm);
            stations.push(StationObservation {
                id,
                location,
                distance_cm,
            });
        }
        let outcome = match self.refiner.lock().run_pass(&local, &stations) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%err, "refinement pass failed");
                return;
            }
        };
        if let Err(err) = self.directory.set_location(self.local_id, &outcome.location) {
            warn!(%err, "could not publish refined location");
        }
    }
}

/// What a given operating level runs each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateActions {
    pub ranging: bool,
    pub localization: bool,
    /// Indicator color shown while the level is active.
    pub rgb: Rgb,
}

/// Events the orchestrator surfaces to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// The operating level read from the local `level` field changed.
    StateChanged { from: i16, to: i16 },
    Ranging(RangingEvent),
}

pub struct Orchestrator {
    directory: Arc<DeviceDirectory>,
    ranging: Arc<RangingStore>,
    localization: Arc<dyn Localization>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    local_id: u32,
    states: Mutex<HashMap<i16, StateActions>>,
    current_state: Mutex<i16>,
    nearest: Mutex<Option<u32>>,
    ranging_events: Mutex<Receiver<RangingEvent>>,
    /// Newest timestamp forwarded so far; older events are dropped.
    last_forwarded: Mutex<Ticks>,
    subscribers: Mutex<Vec<Sender<OrchestratorEvent>>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        directory: Arc<DeviceDirectory>,
        ranging: Arc<RangingStore>,
        localization: Arc<dyn Localization>,
        clock: Arc<dyn Clock>,
        local_id: u32,
    ) -> Self {
        let (tx, rx) = channel();
        ranging.set_event_sink(tx);
        let orchestrator = Self {
            directory,
            ranging,
            localization,
            clock,
            config,
            local_id,
            states: Mutex::new(HashMap::new()),
            current_state: Mutex::new(0),
            nearest: Mutex::new(None),
            ranging_events: Mutex::new(rx),
            last_forwarded: Mutex::new(0),
            subscribers: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        };
        orchestrator.install_default_states();
        orchestrator
    }

    /// Level 0 idles, 1 ranges, 2 estimates, 3 does both.
    fn install_default_states(&self) {
        let mut states = self.states.lock();
        states.insert(
            0,
            StateActions {
                ranging: false,
                localization: false,
                rgb: Rgb::new(0, 0, 255),
            },
        );
        states.insert(
            1,
            StateActions {
                ranging: true,
                localization: false,
                rgb: Rgb::new(255, 0, 0),
            },
        );
        states.insert(
            2,
            StateActions {
                ranging: false,
                localization: true,
                rgb: Rgb::new(255, 0, 255),
            },
        );
        states.insert(
            3,
            StateActions {
                ranging: true,
                localization: true,
                rgb: Rgb::new(0, 255, 0),
            },
        );
    }

    /// Replace what a level does.
    pub fn set_state_actions(&self, level: i16, actions: StateActions) {
        self.states.lock().insert(level, actions);
    }

    pub fn current_state(&self) -> i16 {
        *self.current_state.lock()
    }

    /// Register a subscriber for orchestrator events.
    pub fn subscribe(&self) -> Receiver<OrchestratorEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, event: OrchestratorEvent) {
        // Dead subscribers are dropped on the way.
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Forward a ranging event unless it arrived out of order.
    fn forward_ranging_event(&self, event: RangingEvent) {
        let timestamp = match &event {
            RangingEvent::MeasurementDone { timestamp, .. } => *timestamp,
            RangingEvent::NearestChanged { timestamp, .. } => *timestamp,
        };
        let mut last = self.last_forwarded.lock();
        if timestamp < *last {
            warn!(timestamp, last = *last, "dropping out-of-order event");
            return;
        }
        *last = timestamp;
        drop(last);
        self.publish(OrchestratorEvent::Ranging(event));
    }

    fn drain_ranging_events(&self) {
        let events: Vec<RangingEvent> = self.ranging_events.lock().try_iter().collect();
        for event in events {
            self.forward_ranging_event(event);
        }
    }

    fn ranging_sweep(&self, now: Ticks) {
        for id in self.directory.station_ids() {
            if let Err(err) = self.directory.measure_distance(id) {
                debug!(station = id, %err, "sweep measurement failed");
            }
        }
        let nearest = self
            .ranging
            .nearest_device(
                now,
                self.config.drift_cm_per_100ms,
                self.config.nearest_threshold_cm,
            )
            .map(|(id, _)| id);
        let mut previous = self.nearest.lock();
        if nearest != *previous {
            info!(?nearest, "nearest device changed");
            *previous = nearest;
            drop(previous);
            self.forward_ranging_event(RangingEvent::NearestChanged {
                point_id: nearest,
                timestamp: now,
            });
        }
    }

    /// One update pass: read the operating level, switch state if it moved,
    /// run the level's actions, pump events to subscribers.
    pub fn tick(&self) {
        let now = self.clock.now();
        let level = match self.directory.get_level(self.local_id) {
            Ok(level) => level,
            Err(err) => {
                warn!(%err, "could not read operating level, assuming 0");
                0
            }
        };

        {
            let mut current = self.current_state.lock();
            if *current != level {
                info!(from = *current, to = level, "operating level changed");
                let from = *current;
                *current = level;
                drop(current);
                self.publish(OrchestratorEvent::StateChanged { from, to: level });
            }
        }

        let actions = self.states.lock().get(&level).copied();
        let Some(actions) = actions else {
            warn!(level, "no actions configured for level");
            self.drain_ranging_events();
            return;
        };

        if actions.ranging {
            self.ranging_sweep(now);
        }
        if actions.localization {
            self.localization.tick(now);
        }
        self.drain_ranging_events();
    }

    /// Spawn the periodic update thread.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("orchestrator".to_string())
            .spawn(move || {
                let period = Duration::from_millis(this.config.update_period_ms);
                while this.running.load(Ordering::SeqCst) {
                    this.tick();
                    this.clock.sleep(period);
                }
            })
            .expect("spawn orchestrator thread");
        *self.handle.lock() = Some(handle);
    }

    /// Stop the update thread. A tick in flight completes naturally.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}
