//! Session configuration
//!
//! Parameters fixed when a render session is created. Values can be built in
//! code or loaded from JSON; missing fields take their defaults.

use crate::constants::{
    DEFAULT_MEMORY_LIMIT, DEFAULT_MIXER_RATE, DEFAULT_PATCH_CLOCK_RATE, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SEQUENCE_CLOCK_RATE,
};
use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Configuration of one audio session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host output rate in Hz
    pub mixer_rate: u32,
    /// Sequence tick rate in Hz (0 selects the default of 700 Hz)
    pub sequence_clock_rate: u32,
    /// Patch-table tick rate in Hz (0 selects the default of 140 Hz)
    pub patch_clock_rate: u32,
    /// Restart the sequence from its first record after the last one
    pub loop_sequence: bool,
    /// Byte budget of generator memory available to blobs
    pub memory_limit: usize,
    /// Chunk slots preallocated by the legacy sample queue
    pub queue_capacity: usize,
}

impl SessionConfig {
    /// Default configuration at the given mixer rate
    pub fn new(mixer_rate: u32) -> Self {
        SessionConfig {
            mixer_rate,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)
            .map_err(|e| BridgeError::ConfigError(format!("Malformed session config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a session
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the mixer rate or the memory budget is zero.
    pub fn validate(&self) -> Result<()> {
        if self.mixer_rate == 0 {
            return Err(BridgeError::ConfigError(
                "mixer_rate must be greater than 0".into(),
            ));
        }
        if self.memory_limit == 0 {
            return Err(BridgeError::ConfigError(
                "memory_limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Sequence clock with the zero fallback applied
    pub fn effective_sequence_clock(&self) -> u32 {
        if self.sequence_clock_rate == 0 {
            DEFAULT_SEQUENCE_CLOCK_RATE
        } else {
            self.sequence_clock_rate
        }
    }

    /// Patch-table clock with the zero fallback applied
    pub fn effective_patch_clock(&self) -> u32 {
        if self.patch_clock_rate == 0 {
            DEFAULT_PATCH_CLOCK_RATE
        } else {
            self.patch_clock_rate
        }
    }

    /// Output samples generated per sequence tick (at least 1)
    pub fn samples_per_music_tick(&self) -> u32 {
        (self.mixer_rate / self.effective_sequence_clock()).max(1)
    }

    /// Sequence ticks between two patch-table steps (at least 1)
    pub fn music_ticks_per_patch_tick(&self) -> u32 {
        (self.effective_sequence_clock() / self.effective_patch_clock()).max(1)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            mixer_rate: DEFAULT_MIXER_RATE,
            sequence_clock_rate: DEFAULT_SEQUENCE_CLOCK_RATE,
            patch_clock_rate: DEFAULT_PATCH_CLOCK_RATE,
            loop_sequence: true,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = SessionConfig::default();
        assert_eq!(config.samples_per_music_tick(), 63);
        assert_eq!(config.music_ticks_per_patch_tick(), 5);
    }

    #[test]
    fn test_zero_clocks_fall_back_to_defaults() {
        let config = SessionConfig {
            sequence_clock_rate: 0,
            patch_clock_rate: 0,
            ..SessionConfig::new(48_000)
        };
        assert_eq!(config.effective_sequence_clock(), 700);
        assert_eq!(config.effective_patch_clock(), 140);
        assert_eq!(config.samples_per_music_tick(), 68);
    }

    #[test]
    fn test_timing_never_reaches_zero() {
        let config = SessionConfig {
            mixer_rate: 100,
            sequence_clock_rate: 700,
            patch_clock_rate: 5_000,
            ..SessionConfig::default()
        };
        assert_eq!(config.samples_per_music_tick(), 1);
        assert_eq!(config.music_ticks_per_patch_tick(), 1);
    }

    #[test]
    fn test_from_json_with_partial_fields() {
        let config =
            SessionConfig::from_json_str(r#"{"mixer_rate": 48000, "loop_sequence": false}"#)
                .expect("valid config");
        assert_eq!(config.mixer_rate, 48_000);
        assert!(!config.loop_sequence);
        assert_eq!(config.sequence_clock_rate, 700);
    }

    #[test]
    fn test_zero_mixer_rate_rejected() {
        let result = SessionConfig::from_json_str(r#"{"mixer_rate": 0}"#);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("mixer_rate"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = SessionConfig::from_json_str("{not json");
        assert!(matches!(result, Err(BridgeError::ConfigError(_))));
    }
}
