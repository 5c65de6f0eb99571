//! Sliding-window measurement filter.
//!
//! Keeps the most recent measurements in a bounded deque together with
//! running sums of distance and RSSI, so the mean is O(1) per push.
//! Eviction is strict FIFO.

use std::collections::VecDeque;

use crate::core::constants::DEFAULT_FILTER_CAPACITY;
use crate::ranging::RangingResult;

#[derive(Debug, Clone)]
pub struct FilterWindow {
    window: VecDeque<RangingResult>,
    capacity: usize,
    distance_sum: u64,
    rssi_sum: i32,
}

impl Default for FilterWindow {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_CAPACITY)
    }
}

impl FilterWindow {
    /// Create a window holding at most `capacity` measurements.
    /// A zero capacity is coerced to 1; an empty window cannot filter.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            distance_sum: 0,
            rssi_sum: 0,
        }
    }

    /// Push one measurement, evicting the oldest when full, and return the
    /// current window mean.
    pub fn push(&mut self, sample: RangingResult) -> RangingResult {
        if self.window.len() == self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.distance_sum -= u64::from(evicted.distance_cm);
                self.rssi_sum -= i32::from(evicted.rssi);
            }
        }
        self.distance_sum += u64::from(sample.distance_cm);
        self.rssi_sum += i32::from(sample.rssi);
        self.window.push_back(sample);
        self.mean().expect("window is non-empty after push")
    }

    /// Mean distance and RSSI over the current window contents.
    pub fn mean(&self) -> Option<RangingResult> {
        let n = self.window.len();
        if n == 0 {
            return None;
        }
        let distance_cm = (self.distance_sum / n as u64) as u32;
        let rssi = (self.rssi_sum / n as i32).clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8;
        Some(RangingResult { distance_cm, rssi })
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.distance_sum = 0;
        self.rssi_sum = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(distance_cm: u32, rssi: i8) -> RangingResult {
        RangingResult { distance_cm, rssi }
    }

    #[test]
    fn test_mean_evicts_oldest_fifo() {
        // Capacity 2: after pushing 10, 20, 30 the 10 has been evicted
        // and the mean is (20 + 30) / 2 = 25.
        let mut filter = FilterWindow::new(2);
        filter.push(sample(10, -40));
        filter.push(sample(20, -40));
        let mean = filter.push(sample(30, -40));
        assert_eq!(mean.distance_cm, 25);
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_empty_window_has_no_mean() {
        let filter = FilterWindow::new(3);
        assert!(filter.mean().is_none());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_rssi_is_averaged() {
        let mut filter = FilterWindow::new(4);
        filter.push(sample(100, -40));
        let mean = filter.push(sample(100, -50));
        assert_eq!(mean.rssi, -45);
        assert_eq!(mean.distance_cm, 100);
    }

    #[test]
    fn test_clear_resets_sums() {
        let mut filter = FilterWindow::new(2);
        filter.push(sample(500, -70));
        filter.clear();
        assert!(filter.mean().is_none());
        let mean = filter.push(sample(100, -40));
        assert_eq!(mean.distance_cm, 100);
        assert_eq!(mean.rssi, -40);
    }
}
