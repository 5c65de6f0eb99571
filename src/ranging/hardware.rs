//! Ranging hardware boundary.
//!
//! The radio stack consumes a session request ("range toward MAC X on
//! channel Y with these frame parameters") and later delivers an
//! asynchronous completion report. The report lands in a single shared
//! result slot per radio stack; the slot is cleared before each new request
//! so a stale completion from an earlier session is never consumed.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::ranging::error::RangingError;

/// Parameters of one ranging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtmRequest {
    pub mac: [u8; 6],
    pub channel: u8,
    pub frame_count: u8,
    pub burst_period: u8,
}

/// Outcome reported by the radio for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtmStatus {
    Success,
    Failure,
}

/// A single per-frame measurement inside a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtmFrameEntry {
    pub rtt_ns: u32,
    pub rssi: i8,
}

/// Completion report of one ranging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtmReport {
    pub status: FtmStatus,
    pub rtt_raw_ns: u32,
    pub rtt_est_ns: u32,
    /// Raw distance estimate from the radio, centimeters. Uncorrected.
    pub dist_est_cm: u32,
    pub frames: Vec<FtmFrameEntry>,
}

impl FtmReport {
    /// Mean RSSI over the per-frame entries, if any were reported.
    pub fn mean_rssi(&self) -> Option<i8> {
        if self.frames.is_empty() {
            return None;
        }
        let sum: i32 = self.frames.iter().map(|f| i32::from(f.rssi)).sum();
        Some((sum / self.frames.len() as i32) as i8)
    }
}

/// Shared completion slot: one per radio stack.
#[derive(Default)]
pub struct FtmResultSlot {
    report: Mutex<Option<FtmReport>>,
    signal: Condvar,
}

impl FtmResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any stale report left over from a previous session. Called
    /// before each new request.
    pub fn clear(&self) {
        self.report.lock().take();
    }

    /// Deliver a completion report. Called from the radio event task.
    pub fn complete(&self, report: FtmReport) {
        *self.report.lock() = Some(report);
        self.signal.notify_all();
    }

    /// Block until a report arrives or the timeout elapses.
    pub fn wait(&self, timeout: Duration) -> Option<FtmReport> {
        let mut guard = self.report.lock();
        if guard.is_none() {
            let result = self.signal.wait_for(&mut guard, timeout);
            if result.timed_out() && guard.is_none() {
                return None;
            }
        }
        guard.take()
    }
}

/// Boundary to the radio stack: starts a session whose completion is
/// delivered through the shared [`FtmResultSlot`].
pub trait FtmInitiator: Send + Sync {
    fn initiate(&self, request: &FtmRequest) -> Result<(), RangingError>;
}

/// Scripted initiator for tests: each `initiate` pops the next scripted
/// outcome and completes the slot with it, or stays silent to provoke a
/// timeout.
pub struct MockFtm {
    slot: std::sync::Arc<FtmResultSlot>,
    script: Mutex<VecDeque<Option<FtmReport>>>,
    pub requests: Mutex<Vec<FtmRequest>>,
}

impl MockFtm {
    pub fn new(slot: std::sync::Arc<FtmResultSlot>) -> Self {
        Self {
            slot,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful report with the given raw distance.
    pub fn push_success(&self, dist_est_cm: u32, rssi: i8) {
        self.script.lock().push_back(Some(FtmReport {
            status: FtmStatus::Success,
            rtt_raw_ns: dist_est_cm * 67,
            rtt_est_ns: dist_est_cm * 67,
            dist_est_cm,
            frames: vec![FtmFrameEntry {
                rtt_ns: dist_est_cm * 67,
                rssi,
            }],
        }));
    }

    /// Queue a failed session report.
    pub fn push_failure(&self) {
        self.script.lock().push_back(Some(FtmReport {
            status: FtmStatus::Failure,
            rtt_raw_ns: 0,
            rtt_est_ns: 0,
            dist_est_cm: 0,
            frames: Vec::new(),
        }));
    }

    /// Queue a silent session: no completion is ever delivered.
    pub fn push_silence(&self) {
        self.script.lock().push_back(None);
    }

    /// Scripted outcomes not yet consumed by an `initiate`.
    pub fn pending_scripts(&self) -> usize {
        self.script.lock().len()
    }
}

impl FtmInitiator for MockFtm {
    fn initiate(&self, request: &FtmRequest) -> Result<(), RangingError> {
        self.requests.lock().push(*request);
        match self.script.lock().pop_front() {
            Some(Some(report)) => {
                self.slot.complete(report);
                Ok(())
            }
            Some(None) => Ok(()), // scripted silence
            None => Ok(()),       // nothing scripted behaves like silence
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_slot_clear_discards_stale_report() {
        let slot = FtmResultSlot::new();
        slot.complete(FtmReport {
            status: FtmStatus::Success,
            rtt_raw_ns: 1,
            rtt_est_ns: 1,
            dist_est_cm: 100,
            frames: Vec::new(),
        });
        slot.clear();
        assert!(slot.wait(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_slot_delivers_completed_report() {
        let slot = Arc::new(FtmResultSlot::new());
        let writer = Arc::clone(&slot);
        let handle = std::thread::spawn(move || {
            writer.complete(FtmReport {
                status: FtmStatus::Success,
                rtt_raw_ns: 7,
                rtt_est_ns: 7,
                dist_est_cm: 321,
                frames: Vec::new(),
            });
        });
        let report = slot.wait(Duration::from_secs(1)).expect("report delivered");
        assert_eq!(report.dist_est_cm, 321);
        handle.join().unwrap();
    }

    #[test]
    fn test_mock_records_requests() {
        let slot = Arc::new(FtmResultSlot::new());
        let mock = MockFtm::new(Arc::clone(&slot));
        mock.push_success(250, -50);
        let request = FtmRequest {
            mac: [1; 6],
            channel: 6,
            frame_count: 16,
            burst_period: 0,
        };
        mock.initiate(&request).unwrap();
        assert_eq!(mock.requests.lock().len(), 1);
        assert_eq!(slot.wait(Duration::from_millis(10)).unwrap().dist_est_cm, 250);
    }
}
