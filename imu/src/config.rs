//! Acquisition parameters and the optional rig description file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TARGET_RATE: f64 = 1000.0;
pub const DEFAULT_DURATION_SECS: f64 = 10.0;
pub const DEFAULT_SAFETY_FACTOR: f64 = 1.1;
/// Upper bound on preallocated samples; about 14 hours at 1 kHz.
pub const MAX_SAMPLE_CAPACITY: usize = 50_000_000;

/// Parameters of one acquisition run. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    target_rate: f64,
    duration_secs: f64,
    safety_factor: f64,
    max_samples: usize,
}

impl AcquisitionConfig {
    /// Builds a config with the default safety factor. Capacity is
    /// `ceil(duration × rate × safety_factor)` and may not exceed
    /// [`MAX_SAMPLE_CAPACITY`].
    pub fn new(target_rate: f64, duration_secs: f64) -> Result<Self, ConfigError> {
        if !(target_rate.is_finite() && target_rate > 0.0) {
            return Err(ConfigError::InvalidRate(target_rate));
        }
        // Duration cannot represent more than u64::MAX seconds.
        if !(duration_secs > 0.0 && duration_secs < u64::MAX as f64) {
            return Err(ConfigError::InvalidDuration(duration_secs));
        }
        let mut config = AcquisitionConfig {
            target_rate,
            duration_secs,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            max_samples: 0,
        };
        config.max_samples = config.derived_capacity()?;
        Ok(config)
    }

    pub fn with_safety_factor(mut self, safety_factor: f64) -> Result<Self, ConfigError> {
        if !(safety_factor.is_finite() && safety_factor >= 1.0) {
            return Err(ConfigError::InvalidSafetyFactor(safety_factor));
        }
        self.safety_factor = safety_factor;
        self.max_samples = self.derived_capacity()?;
        Ok(self)
    }

    /// Overrides the derived capacity with an explicit sample budget.
    pub fn with_max_samples(mut self, max_samples: usize) -> Result<Self, ConfigError> {
        if max_samples == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if max_samples > MAX_SAMPLE_CAPACITY {
            return Err(ConfigError::CapacityTooLarge {
                requested: max_samples as f64,
                limit: MAX_SAMPLE_CAPACITY,
            });
        }
        self.max_samples = max_samples;
        Ok(self)
    }

    fn derived_capacity(&self) -> Result<usize, ConfigError> {
        // Absorb float noise such as 100 × 1.1 = 110.00000000000001.
        let nominal = (self.duration_secs * self.target_rate * self.safety_factor - 1e-9).ceil();
        if !(nominal <= MAX_SAMPLE_CAPACITY as f64) {
            return Err(ConfigError::CapacityTooLarge {
                requested: nominal,
                limit: MAX_SAMPLE_CAPACITY,
            });
        }
        Ok((nominal as usize).max(1))
    }

    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn safety_factor(&self) -> f64 {
        self.safety_factor
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_rate)
    }

    /// Offset of the `index`-th scheduled sample from the session start.
    pub fn scheduled_offset(&self, index: usize) -> Duration {
        Duration::from_secs_f64(index as f64 / self.target_rate)
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Number of samples a run would hold if every cycle landed on schedule.
    pub fn nominal_samples(&self) -> usize {
        (self.duration_secs * self.target_rate).round() as usize
    }
}

/// Contents of a rig description file (TOML). Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub acquisition: AcquisitionSection,
    pub external: ExternalSection,
    pub remote: RemoteSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSection {
    pub target_rate: f64,
    pub safety_factor: f64,
    pub duration: f64,
    pub countdown: u64,
    pub experiments_dir: PathBuf,
}

impl Default for AcquisitionSection {
    fn default() -> Self {
        Self {
            target_rate: DEFAULT_TARGET_RATE,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            duration: DEFAULT_DURATION_SECS,
            countdown: 5,
            experiments_dir: PathBuf::from("experiments"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalSection {
    pub i2c_bus: String,
}

impl Default for ExternalSection {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Power channel driven by `--motor-power`.
    pub power_channel: u8,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 20,
            power_channel: 1,
        }
    }
}

impl RemoteSection {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl RigConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RigConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        AcquisitionConfig::new(self.acquisition.target_rate, self.acquisition.duration)?
            .with_safety_factor(self.acquisition.safety_factor)?;
        if self.remote.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Acquisition parameters for a run of `duration_secs`, or the file's default duration.
    pub fn acquisition_config(&self, duration_secs: Option<f64>) -> Result<AcquisitionConfig, ConfigError> {
        AcquisitionConfig::new(
            self.acquisition.target_rate,
            duration_secs.unwrap_or(self.acquisition.duration),
        )?
        .with_safety_factor(self.acquisition.safety_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_includes_safety_margin() {
        let config = AcquisitionConfig::new(100.0, 1.0).unwrap();
        assert_eq!(config.max_samples(), 110);
        assert_eq!(config.nominal_samples(), 100);
        assert_eq!(config.sample_period(), Duration::from_millis(10));

        let exact = config.with_safety_factor(1.0).unwrap();
        assert_eq!(exact.max_samples(), 100);
    }

    #[test]
    fn explicit_capacity_overrides_derived_one() {
        let config = AcquisitionConfig::new(100.0, 1.0)
            .unwrap()
            .with_max_samples(50)
            .unwrap();
        assert_eq!(config.max_samples(), 50);
        assert!(matches!(
            config.with_max_samples(0),
            Err(ConfigError::ZeroCapacity)
        ));
    }

    #[test]
    fn rejects_nonsense_parameters() {
        assert!(matches!(AcquisitionConfig::new(0.0, 1.0), Err(ConfigError::InvalidRate(_))));
        assert!(matches!(AcquisitionConfig::new(f64::NAN, 1.0), Err(ConfigError::InvalidRate(_))));
        assert!(matches!(AcquisitionConfig::new(100.0, -1.0), Err(ConfigError::InvalidDuration(_))));
        assert!(matches!(
            AcquisitionConfig::new(100.0, 1.0).unwrap().with_safety_factor(0.9),
            Err(ConfigError::InvalidSafetyFactor(_))
        ));
    }

    #[test]
    fn oversized_runs_are_rejected_up_front() {
        assert!(matches!(
            AcquisitionConfig::new(1000.0, 1e18),
            Err(ConfigError::CapacityTooLarge { .. })
        ));
        assert!(matches!(
            AcquisitionConfig::new(1000.0, 1e7),
            Err(ConfigError::CapacityTooLarge { .. })
        ));
        assert!(matches!(
            AcquisitionConfig::new(f64::MAX, 1.0),
            Err(ConfigError::CapacityTooLarge { .. })
        ));

        let config = AcquisitionConfig::new(1000.0, 40_000.0).unwrap();
        assert!(matches!(
            config.with_safety_factor(2.0),
            Err(ConfigError::CapacityTooLarge { .. })
        ));
        assert!(matches!(
            config.with_max_samples(MAX_SAMPLE_CAPACITY + 1),
            Err(ConfigError::CapacityTooLarge { .. })
        ));
        assert_eq!(
            config.with_max_samples(MAX_SAMPLE_CAPACITY).unwrap().max_samples(),
            MAX_SAMPLE_CAPACITY
        );
    }

    #[test]
    fn schedule_offsets_are_anchored_to_start() {
        let config = AcquisitionConfig::new(3000.0, 60.0).unwrap();
        assert_eq!(config.scheduled_offset(0), Duration::ZERO);
        assert_eq!(config.scheduled_offset(180_000), Duration::from_secs(60));
        // Summing the rounded period would land 60 µs early here.
        let summed = config.sample_period() * 179_999;
        let anchored = config.scheduled_offset(179_999);
        assert!(anchored > summed);
        assert!((anchored.as_secs_f64() - 179_999.0 / 3000.0).abs() < 1e-9);
    }

    #[test]
    fn rig_file_fills_missing_fields_with_defaults() {
        let rig: RigConfig = toml::from_str(
            r#"
            [acquisition]
            target_rate = 500.0

            [remote]
            port = "/dev/ttyUSB1"
            "#,
        )
        .unwrap();
        assert_eq!(rig.acquisition.target_rate, 500.0);
        assert_eq!(rig.acquisition.safety_factor, DEFAULT_SAFETY_FACTOR);
        assert_eq!(rig.remote.port, "/dev/ttyUSB1");
        assert_eq!(rig.remote.baud_rate, 115200);
        assert_eq!(rig.external.i2c_bus, "/dev/i2c-1");

        let config = rig.acquisition_config(Some(2.0)).unwrap();
        assert_eq!(config.max_samples(), 1100);
    }

    #[test]
    fn rig_validation_catches_zero_timeout() {
        let mut rig = RigConfig::default();
        assert!(rig.validate().is_ok());
        rig.remote.read_timeout_ms = 0;
        assert!(matches!(rig.validate(), Err(ConfigError::ZeroTimeout)));
    }
}
