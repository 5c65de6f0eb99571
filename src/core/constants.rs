//! Compile-time defaults used across the positioning pipeline.

/// Sliding-window capacity of a ranging filter.
pub const DEFAULT_FILTER_CAPACITY: usize = 5;

/// Ring-buffer capacity of the per-anchor ranging history log.
pub const RANGING_LOG_CAPACITY: usize = 5;

/// Bound on how long a single ranging round trip may block, in milliseconds.
pub const RANGING_TIMEOUT_MS: u64 = 5_000;

/// Empirical linear correction applied to raw FTM distance estimates:
/// `corrected_cm = DIST_CORRECTION_BIAS_CM + DIST_CORRECTION_SLOPE * raw_cm`.
pub const DIST_CORRECTION_SLOPE: f32 = 0.9129;
pub const DIST_CORRECTION_BIAS_CM: f32 = -81.0;

/// Layout units per location unit: locations carry decimeter-scale integer
/// components while the layout works at 72 units per meter-ish `inputscale`,
/// so one location unit maps to 72/10 = 7.2 layout units.
pub const LAYOUT_SCALE: f32 = 7.2;

/// Geometric fallback edges are clamped to this many meters either way.
/// Negative lengths are kept and act as repulsive hints in the layout.
pub const EDGE_LENGTH_CLAMP: f32 = 100.0;

/// Assumed drift speed of a silent peer: cm per 100 ms of measurement age.
pub const DRIFT_CM_PER_100MS: f32 = 3.0;

/// Beyond this effective distance (cm) no device counts as "nearby": 10 m.
pub const NEAREST_THRESHOLD_CM: f32 = 1_000.0;

/// Orchestrator tick period, milliseconds.
pub const UPDATE_PERIOD_MS: u64 = 500;

/// Local-device address bootstrap: attempts and backoff between them.
pub const ADDR_INIT_RETRIES: u32 = 15;
pub const ADDR_INIT_BACKOFF_MS: u64 = 1_000;

/// Multilateration keeps only this many closest anchors; nearer distances
/// are generally more accurate.
pub const CLOSEST_ANCHORS_LIMIT: usize = 5;

/// Broadcast mesh address.
pub const ADDR_BROADCAST: u16 = 0xffff;
