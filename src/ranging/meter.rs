//! Ranging store: owns every [`DistancePoint`], drives measurements through
//! the radio boundary and keeps their filtered history.
//!
//! One measurement per anchor may be in flight at a time; the radio itself
//! is a single shared resource, so the clear-request-wait sequence runs
//! under a store-level gate.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::ranging::error::{LogLookupError, RangingError};
use crate::ranging::hardware::{FtmInitiator, FtmRequest, FtmResultSlot, FtmStatus};
use crate::ranging::log::RangingLogEntry;
use crate::ranging::point::{mac_to_string, DistancePoint};
use crate::ranging::RangingResult;
use crate::utils::clock::{Clock, Ticks};
use crate::utils::config::RangingConfig;

/// Messages emitted by the ranging pipeline. Producers push onto a channel;
/// the orchestrator owns the consumer loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangingEvent {
    /// A measurement toward `point_id` completed; `result` is `None` when it
    /// failed or timed out.
    MeasurementDone {
        point_id: u32,
        result: Option<RangingResult>,
        timestamp: Ticks,
    },
    /// The nearest known device changed; `point_id` is `None` when nothing
    /// is within the nearby threshold anymore.
    NearestChanged {
        point_id: Option<u32>,
        timestamp: Ticks,
    },
}

pub struct RangingStore {
    points: RwLock<HashMap<u32, Arc<Mutex<DistancePoint>>>>,
    mac_index: RwLock<HashMap<String, u32>>,
    next_id: Mutex<u32>,
    initiator: Arc<dyn FtmInitiator>,
    slot: Arc<FtmResultSlot>,
    /// Serializes clear-request-wait against the single radio result slot.
    radio_gate: Mutex<()>,
    clock: Arc<dyn Clock>,
    config: RangingConfig,
    events: Mutex<Option<Sender<RangingEvent>>>,
}

impl RangingStore {
    pub fn new(
        config: RangingConfig,
        initiator: Arc<dyn FtmInitiator>,
        slot: Arc<FtmResultSlot>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            mac_index: RwLock::new(HashMap::new()),
            next_id: Mutex::new(0),
            initiator,
            slot,
            radio_gate: Mutex::new(()),
            clock,
            config,
            events: Mutex::new(None),
        }
    }

    /// Route ranging events onto the given channel.
    pub fn set_event_sink(&self, sender: Sender<RangingEvent>) {
        *self.events.lock() = Some(sender);
    }

    fn emit(&self, event: RangingEvent) {
        if let Some(sender) = self.events.lock().as_ref() {
            // A disconnected consumer is not an error for the producer.
            let _ = sender.send(event);
        }
    }

    /// Register a ranging peer and return its id. Registering the same MAC
    /// again returns the existing id.
    pub fn add_point(&self, mac: [u8; 6], channel: u8) -> u32 {
        let mac_str = mac_to_string(&mac);
        // The index write lock spans the existence check and both inserts,
        // so two concurrent registrations of one MAC cannot mint two ids.
        let mut index = self.mac_index.write();
        if let Some(&existing) = index.get(&mac_str) {
            return existing;
        }
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let mut point = DistancePoint::new(id, mac, channel, self.config.filter_capacity);
        let _ = point.set_frame_count(self.config.frame_count);
        let _ = point.set_burst_period(self.config.burst_period);
        self.points.write().insert(id, Arc::new(Mutex::new(point)));
        index.insert(mac_str, id);
        id
    }

    /// Look up a point id by its canonical MAC string.
    pub fn point_by_mac(&self, mac_str: &str) -> Option<u32> {
        self.mac_index.read().get(mac_str).copied()
    }

    pub fn point_ids(&self) -> Vec<u32> {
        self.points.read().keys().copied().collect()
    }

    fn point(&self, id: u32) -> Result<Arc<Mutex<DistancePoint>>, RangingError> {
        self.points
            .read()
            .get(&id)
            .cloned()
            .ok_or(RangingError::UnknownPoint(id))
    }

    /// Perform one round-trip measurement toward the given anchor.
    ///
    /// Blocks until the radio reports completion or the configured timeout
    /// elapses. On success the raw estimate is corrected, pushed through the
    /// anchor's filter window, and the filtered mean is appended to the
    /// history log and returned. Failed measurements never touch the filter.
    pub fn measure(&self, point_id: u32) -> Result<RangingResult, RangingError> {
        let point = self.point(point_id)?;
        // One in-flight measurement per anchor.
        let mut point = point.try_lock().ok_or(RangingError::Busy(point_id))?;

        let request = FtmRequest {
            mac: *point.mac(),
            channel: point.channel(),
            frame_count: point.frame_count(),
            burst_period: point.burst_period(),
        };

        let report = {
            let _radio = self.radio_gate.lock();
            self.slot.clear();
            self.initiator.initiate(&request)?;
            self.slot.wait(Duration::from_millis(self.config.timeout_ms))
        };

        let timestamp = self.clock.now();
        let report = match report {
            Some(report) if report.status == FtmStatus::Success => report,
            Some(_) | None => {
                debug!(point_id, "ranging got no usable response");
                self.emit(RangingEvent::MeasurementDone {
                    point_id,
                    result: None,
                    timestamp,
                });
                return Err(RangingError::NoResponse {
                    timeout_ms: self.config.timeout_ms,
                });
            }
        };

        let corrected_cm = self.correct(report.dist_est_cm);
        let rssi = report.mean_rssi().unwrap_or(i8::MIN);
        let filtered = point.filter.push(RangingResult {
            distance_cm: corrected_cm,
            rssi,
        });
        point.log.push(RangingLogEntry {
            result: filtered,
            timestamp,
        });
        debug!(
            point_id,
            raw_cm = report.dist_est_cm,
            corrected_cm,
            filtered_cm = filtered.distance_cm,
            "measurement complete"
        );
        self.emit(RangingEvent::MeasurementDone {
            point_id,
            result: Some(filtered),
            timestamp,
        });
        Ok(filtered)
    }

    /// Apply the empirical linear correction to a raw radio estimate.
    fn correct(&self, raw_cm: u32) -> u32 {
        let corrected = self.config.correction_bias_cm + self.config.correction_slope * raw_cm as f32;
        if corrected <= 0.0 {
            0
        } else {
            corrected.round() as u32
        }
    }

    /// History entry `offset` steps back from the newest for an anchor.
    pub fn get_from_log(
        &self,
        point_id: u32,
        offset: usize,
    ) -> Result<RangingLogEntry, LogLookupError> {
        let point = self.point(point_id)?;
        let point = point.lock();
        Ok(point.log.get(offset)?)
    }

    /// Most recent filtered measurement for an anchor, if any.
    pub fn last_distance(&self, point_id: u32) -> Option<RangingLogEntry> {
        let point = self.points.read().get(&point_id).cloned()?;
        let point = point.lock();
        point.log.latest()
    }

    /// Forwarded configuration setters; fail closed like the point's own.
    pub fn set_frame_count(&self, point_id: u32, value: u8) -> Result<(), RangingError> {
        self.point(point_id)?.lock().set_frame_count(value)
    }

    pub fn set_burst_period(&self, point_id: u32, value: u8) -> Result<(), RangingError> {
        self.point(point_id)?.lock().set_burst_period(value)
    }

    /// Effective distance of an anchor under the time-decay assumption: a
    /// peer silent for `age` could have drifted `drift_cm_per_100ms` per
    /// 100 ms away from its last measured distance.
    pub fn effective_distance_cm(
        &self,
        entry: &RangingLogEntry,
        now: Ticks,
        drift_cm_per_100ms: f32,
    ) -> f32 {
        let age_ms = now.saturating_sub(entry.timestamp);
        entry.result.distance_cm as f32 + (age_ms as f32 / 100.0) * drift_cm_per_100ms
    }

    /// The anchor with the smallest effective distance, unless everything is
    /// beyond `threshold_cm`.
    pub fn nearest_device(
        &self,
        now: Ticks,
        drift_cm_per_100ms: f32,
        threshold_cm: f32,
    ) -> Option<(u32, f32)> {
        let points = self.points.read();
        let mut best: Option<(u32, f32)> = None;
        for (&id, point) in points.iter() {
            let Some(entry) = point.lock().log.latest() else {
                continue;
            };
            let effective = self.effective_distance_cm(&entry, now, drift_cm_per_100ms);
            if best.map_or(true, |(_, d)| effective < d) {
                best = Some((id, effective));
            }
        }
        match best {
            Some((_, d)) if d > threshold_cm => None,
            other => other,
        }
    }
}
