//! Runtime configuration for the localization core.
//!
//! Configuration is plain data with serde derives; embedding firmware or a
//! host harness deserializes it from JSON and hands it to the subsystem
//! constructors. `validate()` fails closed: an invalid section rejects the
//! whole config instead of partially applying.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::constants::*;
use crate::ranging::point::{burst_period_allowed, ALLOWED_FRAME_COUNTS};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {parameter}: {value}")]
    InvalidValue { parameter: String, value: String },
}

/// Ranging & filtering section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangingConfig {
    /// Sliding-window capacity of the measurement filter.
    pub filter_capacity: usize,
    /// Bound on a single round-trip measurement, milliseconds.
    pub timeout_ms: u64,
    /// Linear correction applied to raw distance estimates.
    pub correction_slope: f32,
    pub correction_bias_cm: f32,
    /// FTM frames per burst. Must be one of `{0, 16, 24, 32, 64}`.
    pub frame_count: u8,
    /// Burst period in 100 ms units. Must be 0 or in `2..=255`.
    pub burst_period: u8,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            filter_capacity: DEFAULT_FILTER_CAPACITY,
            timeout_ms: RANGING_TIMEOUT_MS,
            correction_slope: DIST_CORRECTION_SLOPE,
            correction_bias_cm: DIST_CORRECTION_BIAS_CM,
            frame_count: 16,
            burst_period: 0,
        }
    }
}

/// Serial transport section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Message separator byte on the wire.
    pub separator: u8,
    /// Reader buffer bound; a separator-less buffer this full is discarded.
    pub max_frame_len: usize,
    /// Cache entries older than this trigger a background re-fetch, ms.
    pub cache_freshness_ms: u64,
    /// Bound on cache/field-store lock acquisition, ms.
    pub lock_timeout_ms: u64,
    /// Bound on a first-fetch GET waiting for the peer's response, ms.
    pub response_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            separator: b'\n',
            max_frame_len: 256,
            cache_freshness_ms: 2_000,
            lock_timeout_ms: 1_000,
            response_timeout_ms: 1_000,
        }
    }
}

/// Orchestrator / device directory section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Periodic tick, milliseconds.
    pub update_period_ms: u64,
    /// Local address bootstrap retries and backoff.
    pub addr_retries: u32,
    pub addr_backoff_ms: u64,
    /// Assumed drift of a silent peer, cm per 100 ms of measurement age.
    pub drift_cm_per_100ms: f32,
    /// Effective distance beyond which no device counts as nearby, cm.
    pub nearest_threshold_cm: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            update_period_ms: UPDATE_PERIOD_MS,
            addr_retries: ADDR_INIT_RETRIES,
            addr_backoff_ms: ADDR_INIT_BACKOFF_MS,
            drift_cm_per_100ms: DRIFT_CM_PER_100MS,
            nearest_threshold_cm: NEAREST_THRESHOLD_CM,
        }
    }
}

/// Graph refinement section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Layout mode hint passed to the layout engine.
    pub mode: String,
    /// Bound on layout iterations per refinement pass.
    pub max_iters_per_step: u16,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            mode: "sgd".to_string(),
            max_iters_per_step: 30,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub ranging: RangingConfig,
    pub transport: TransportConfig,
    pub orchestrator: OrchestratorConfig,
    pub topology: TopologyConfig,
}

impl SystemConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
                parameter: "json".to_string(),
                value: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ranging.filter_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "ranging.filter_capacity".to_string(),
                value: "0".to_string(),
            });
        }
        if !ALLOWED_FRAME_COUNTS.contains(&self.ranging.frame_count) {
            return Err(ConfigError::InvalidValue {
                parameter: "ranging.frame_count".to_string(),
                value: self.ranging.frame_count.to_string(),
            });
        }
        if !burst_period_allowed(self.ranging.burst_period) {
            return Err(ConfigError::InvalidValue {
                parameter: "ranging.burst_period".to_string(),
                value: self.ranging.burst_period.to_string(),
            });
        }
        if self.transport.max_frame_len < 8 {
            return Err(ConfigError::InvalidValue {
                parameter: "transport.max_frame_len".to_string(),
                value: self.transport.max_frame_len.to_string(),
            });
        }
        if self.orchestrator.update_period_ms == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "orchestrator.update_period_ms".to_string(),
                value: "0".to_string(),
            });
        }
        if self.topology.max_iters_per_step == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "topology.max_iters_per_step".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SystemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_frame_count_rejected() {
        let mut config = SystemConfig::default();
        config.ranging.frame_count = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_burst_period_rejected() {
        let mut config = SystemConfig::default();
        config.ranging.burst_period = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_partial_overrides() {
        let config =
            SystemConfig::from_json(r#"{"transport": {"separator": 10, "max_frame_len": 128,
                "cache_freshness_ms": 500, "lock_timeout_ms": 100, "response_timeout_ms": 200}}"#)
                .unwrap();
        assert_eq!(config.transport.max_frame_len, 128);
        assert_eq!(config.ranging.frame_count, 16);
    }
}
