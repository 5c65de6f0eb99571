//! Ranging error taxonomy.

use thiserror::Error;

/// Failures of a ranging operation or its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangingError {
    /// The peer did not answer within the measurement timeout.
    #[error("no ranging response from peer within {timeout_ms} ms")]
    NoResponse { timeout_ms: u64 },
    /// A configuration setter was given a value outside its allowed set.
    /// The previous value is kept.
    #[error("invalid ranging config: {parameter}={value}")]
    InvalidConfig { parameter: &'static str, value: u8 },
    /// No distance point with the given id exists.
    #[error("unknown distance point id {0}")]
    UnknownPoint(u32),
    /// A measurement toward this anchor is already in flight; per-anchor
    /// ranging is serialized.
    #[error("ranging toward point {0} already in flight")]
    Busy(u32),
}

/// A history lookup can fail either at the store level (no such point) or
/// inside the log itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogLookupError {
    #[error(transparent)]
    Point(#[from] RangingError),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Failures of a history-log lookup. "Never logged anything" and "offset
/// past the recorded entries" are distinct conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("ranging log is empty")]
    Empty,
    #[error("log offset {offset} out of range, {available} entries available")]
    OffsetOutOfRange { offset: usize, available: usize },
}
