//! Per-anchor ranging peer state.

use crate::ranging::error::RangingError;
use crate::ranging::filter::FilterWindow;
use crate::ranging::log::RangingLog;

/// FTM frame counts the radio accepts (0 lets the radio pick).
pub const ALLOWED_FRAME_COUNTS: [u8; 5] = [0, 16, 24, 32, 64];

/// Burst periods the radio accepts: disabled, or 2..=255 (100 ms units).
pub fn burst_period_allowed(value: u8) -> bool {
    value == 0 || value >= 2
}

/// Render a MAC address in the canonical `aa:bb:cc:dd:ee:ff` form.
pub fn mac_to_string(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// One ranging peer: radio identity, session parameters, and the filter and
/// history the measurements flow through. Owned exclusively by the
/// [`RangingStore`](crate::ranging::RangingStore) that created it.
#[derive(Debug)]
pub struct DistancePoint {
    id: u32,
    mac: [u8; 6],
    mac_str: String,
    channel: u8,
    frame_count: u8,
    burst_period: u8,
    pub(crate) filter: FilterWindow,
    pub(crate) log: RangingLog,
}

impl DistancePoint {
    pub fn new(id: u32, mac: [u8; 6], channel: u8, filter_capacity: usize) -> Self {
        Self {
            id,
            mac,
            mac_str: mac_to_string(&mac),
            channel,
            frame_count: 16,
            burst_period: 0,
            filter: FilterWindow::new(filter_capacity),
            log: RangingLog::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn mac(&self) -> &[u8; 6] {
        &self.mac
    }

    pub fn mac_str(&self) -> &str {
        &self.mac_str
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn frame_count(&self) -> u8 {
        self.frame_count
    }

    pub fn burst_period(&self) -> u8 {
        self.burst_period
    }

    /// Set the FTM frame count. Rejects values outside the allowed set and
    /// keeps the previous value.
    pub fn set_frame_count(&mut self, frame_count: u8) -> Result<(), RangingError> {
        if !ALLOWED_FRAME_COUNTS.contains(&frame_count) {
            return Err(RangingError::InvalidConfig {
                parameter: "frame_count",
                value: frame_count,
            });
        }
        self.frame_count = frame_count;
        Ok(())
    }

    /// Set the FTM burst period. Rejects values outside the allowed set and
    /// keeps the previous value.
    pub fn set_burst_period(&mut self, burst_period: u8) -> Result<(), RangingError> {
        if !burst_period_allowed(burst_period) {
            return Err(RangingError::InvalidConfig {
                parameter: "burst_period",
                value: burst_period,
            });
        }
        self.burst_period = burst_period;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_fails_closed() {
        let mut point = DistancePoint::new(1, [0; 6], 1, 5);
        assert_eq!(point.frame_count(), 16);
        assert!(point.set_frame_count(8).is_err());
        assert_eq!(point.frame_count(), 16);
        assert!(point.set_frame_count(64).is_ok());
        assert_eq!(point.frame_count(), 64);
    }

    #[test]
    fn test_burst_period_fails_closed() {
        let mut point = DistancePoint::new(1, [0; 6], 1, 5);
        assert!(point.set_burst_period(1).is_err());
        assert_eq!(point.burst_period(), 0);
        assert!(point.set_burst_period(2).is_ok());
        assert!(point.set_burst_period(255).is_ok());
        assert!(point.set_burst_period(0).is_ok());
    }

    #[test]
    fn test_mac_formatting() {
        let mac = [0x34, 0xb4, 0x72, 0x6a, 0x77, 0xc1];
        let point = DistancePoint::new(7, mac, 6, 5);
        assert_eq!(point.mac_str(), "34:b4:72:6a:77:c1");
    }
}
