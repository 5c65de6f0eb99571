//! Round-trip-time ranging: measurement, correction, filtering and the
//! bounded per-anchor history log.

pub mod error;
pub mod filter;
pub mod hardware;
pub mod log;
pub mod meter;
pub mod point;

pub use error::{LogError, LogLookupError, RangingError};
pub use filter::FilterWindow;
pub use hardware::{FtmInitiator, FtmReport, FtmRequest, FtmResultSlot, FtmStatus, MockFtm};
pub use log::{RangingLog, RangingLogEntry};
pub use meter::{RangingEvent, RangingStore};
pub use point::DistancePoint;

use serde::{Deserialize, Serialize};

/// One corrected, filtered ranging outcome toward a single anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangingResult {
    /// Filtered, corrected distance in centimeters. Never the raw FTM output.
    pub distance_cm: u32,
    /// Mean received signal strength over the filter window.
    pub rssi: i8,
}
