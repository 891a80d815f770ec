//! Startup configuration for the EDR pipeline
//!
//! Values are fixed once an [`EdrCore`](crate::EdrCore) is built; there are no
//! runtime setters.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StorageError};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ProcessorConfig {
    /// ECG sampling rate of the upstream device (Hz)
    pub sample_rate_hz: u32,
    /// Length of the trailing analysis window (s)
    pub window_secs: u32,
    /// Interval between hop worker ticks (s)
    pub hop_secs: u32,
    /// Rolling standard deviation span for the intensity gate (s)
    pub intensity_window_secs: u32,
    /// Minimum derived-signal intensity for a rate sample to count
    pub intensity_threshold: f64,
    /// Windows with a standard deviation below this are treated as flat
    pub flat_epsilon: f64,
    /// Maximum number of raw samples kept in the buffer
    pub buffer_capacity: usize,
    /// Number of oldest samples dropped when the buffer overflows
    pub eviction_batch: usize,
    /// Length of the tumbling aggregation window (s)
    pub minute_secs: u32,
    /// Minute averages at or below this are recorded as 0 bpm
    pub clamp_floor_bpm: f64,
    /// Maximum number of minute averages kept in the history
    pub history_capacity: usize,
    /// Ingestion silence after which buffered state is discarded (s)
    pub stale_timeout_secs: u32,
    /// Interval between staleness checks (s)
    pub stale_check_secs: u32,
    /// Upper bound on a single decomposer call (ms)
    pub decompose_timeout_ms: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50,
            window_secs: 30,
            hop_secs: 10,
            intensity_window_secs: 3,
            intensity_threshold: 0.01,
            flat_epsilon: 1e-3,
            buffer_capacity: 4000,
            eviction_batch: 500,
            minute_secs: 60,
            clamp_floor_bpm: 5.0,
            history_capacity: 1440,
            stale_timeout_secs: 300,
            stale_check_secs: 30,
            decompose_timeout_ms: 2000,
        }
    }
}

impl ProcessorConfig {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }

        let durations = [
            ("window_secs", self.window_secs),
            ("hop_secs", self.hop_secs),
            ("intensity_window_secs", self.intensity_window_secs),
            ("minute_secs", self.minute_secs),
            ("stale_timeout_secs", self.stale_timeout_secs),
            ("stale_check_secs", self.stale_check_secs),
            ("decompose_timeout_ms", self.decompose_timeout_ms),
        ];
        for (field, value) in durations {
            if value == 0 {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "history_capacity",
            });
        }

        let window = self.window_samples();
        if self.buffer_capacity < window {
            return Err(ConfigError::CapacityBelowWindow {
                capacity: self.buffer_capacity,
                window,
            });
        }
        if self.eviction_batch == 0 || self.eviction_batch > self.buffer_capacity {
            return Err(ConfigError::EvictionBatch {
                batch: self.eviction_batch,
                capacity: self.buffer_capacity,
            });
        }

        let thresholds = [
            ("intensity_threshold", self.intensity_threshold),
            ("flat_epsilon", self.flat_epsilon),
            ("clamp_floor_bpm", self.clamp_floor_bpm),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { field });
            }
        }

        Ok(())
    }

    /// Number of samples in one analysis window (`W = fs * window_secs`).
    pub const fn window_samples(&self) -> usize {
        (self.sample_rate_hz as usize) * (self.window_secs as usize)
    }

    /// Number of samples spanned by the intensity rolling window.
    pub const fn intensity_samples(&self) -> usize {
        (self.sample_rate_hz as usize) * (self.intensity_window_secs as usize)
    }

    pub const fn hop_interval(&self) -> Duration {
        Duration::from_secs(self.hop_secs as u64)
    }

    pub const fn minute_length(&self) -> Duration {
        Duration::from_secs(self.minute_secs as u64)
    }

    pub const fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs as u64)
    }

    pub const fn stale_check_interval(&self) -> Duration {
        Duration::from_secs(self.stale_check_secs as u64)
    }

    pub const fn decompose_timeout(&self) -> Duration {
        Duration::from_millis(self.decompose_timeout_ms as u64)
    }

    /// Serialize for provisioning storage.
    pub fn to_bytes(&self) -> Result<alloc::vec::Vec<u8>, StorageError> {
        postcard::to_allocvec(self).map_err(StorageError::Encode)
    }

    /// Load a configuration written by [`ProcessorConfig::to_bytes`] and validate it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::Error> {
        let config: Self = postcard::from_bytes(bytes).map_err(StorageError::Decode)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ProcessorConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.window_samples(), 1500);
        assert_eq!(config.intensity_samples(), 150);
    }

    #[test]
    fn zero_sample_rate_rejected() {
        let config = ProcessorConfig {
            sample_rate_hz: 0,
            ..ProcessorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroSampleRate));
    }

    #[test]
    fn capacity_must_hold_a_window() {
        let config = ProcessorConfig {
            buffer_capacity: 1000,
            eviction_batch: 100,
            ..ProcessorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::CapacityBelowWindow {
                capacity: 1000,
                window: 1500
            })
        );
    }

    #[test]
    fn eviction_batch_bounds() {
        let zero = ProcessorConfig {
            eviction_batch: 0,
            ..ProcessorConfig::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::EvictionBatch { batch: 0, .. })
        ));

        let oversized = ProcessorConfig {
            eviction_batch: 5000,
            ..ProcessorConfig::default()
        };
        assert!(matches!(
            oversized.validate(),
            Err(ConfigError::EvictionBatch { batch: 5000, .. })
        ));
    }

    #[test]
    fn negative_threshold_rejected() {
        let config = ProcessorConfig {
            intensity_threshold: -0.5,
            ..ProcessorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThreshold {
                field: "intensity_threshold"
            })
        );
    }

    #[test]
    fn zero_hop_rejected() {
        let config = ProcessorConfig {
            hop_secs: 0,
            ..ProcessorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration { field: "hop_secs" })
        );
    }

    #[test]
    fn bytes_round_trip_preserves_fields() {
        let config = ProcessorConfig {
            hop_secs: 5,
            intensity_threshold: 0.05,
            ..ProcessorConfig::default()
        };
        let bytes = config.to_bytes().unwrap();
        let loaded = ProcessorConfig::from_bytes(&bytes).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_stored_config_is_rejected_on_load() {
        let config = ProcessorConfig {
            sample_rate_hz: 0,
            ..ProcessorConfig::default()
        };
        let bytes = config.to_bytes().unwrap();
        assert!(matches!(
            ProcessorConfig::from_bytes(&bytes),
            Err(crate::Error::Config(ConfigError::ZeroSampleRate))
        ));
    }
}
