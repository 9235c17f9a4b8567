//! Channel configuration
//!
//! Timeouts, dropout limits, burst capacity and the crank-torque-frequency
//! calibration offset. Every field has a default, so a YAML file only needs
//! the values it changes:
//!
//! ```yaml
//! channel:
//!   blanking_timeout_secs: 3.0
//!   srm_offset: 512.0
//! sensors:
//!   - class: power
//!     device_type: 11
//!     network: 1
//!     period: 4091
//!     frequency: 57
//!     name: Power (8Hz)
//!     suffix: p
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{AntError, Result};
use crate::protocol::SEARCH_TIMEOUT_UNIT_SECS;
use crate::registry::{SensorRegistry, SensorType};

/// Longest accepted timeout, one day.
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Per-channel tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Silence before a channel is reported stale.
    pub blanking_timeout_secs: f64,
    /// Window for collapsing RX failures into one drop notification.
    pub drop_timeout_secs: f64,
    /// Search timeout while quick-searching.
    pub scan_timeout_secs: f64,
    /// Search timeout while waiting, and after a device was found.
    pub lost_timeout_secs: f64,
    /// Stagnant messages before a power meter reads zero.
    pub power_dropout_limit: u32,
    /// Stagnant messages before heart rate, speed or cadence read zero.
    pub rate_dropout_limit: u32,
    /// Bytes kept from one burst transfer.
    pub burst_capacity: usize,
    /// Zero offset for crank torque frequency meters, in Hz.
    ///
    /// Real meters report this through a calibration exchange; the default is
    /// a typical value.
    pub srm_offset: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            blanking_timeout_secs: 2.0,
            drop_timeout_secs: 2.0,
            scan_timeout_secs: 10.0,
            lost_timeout_secs: 30.0,
            power_dropout_limit: 4,
            rate_dropout_limit: 12,
            burst_capacity: 128,
            srm_offset: 428.0,
        }
    }
}

impl ChannelConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject timeouts that cannot be represented as a [`Duration`].
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("blanking_timeout_secs", self.blanking_timeout_secs),
            ("drop_timeout_secs", self.drop_timeout_secs),
            ("scan_timeout_secs", self.scan_timeout_secs),
            ("lost_timeout_secs", self.lost_timeout_secs),
        ];
        for (field, secs) in timeouts {
            if !(0.0..=MAX_TIMEOUT_SECS).contains(&secs) {
                return Err(AntError::config(
                    field,
                    format!("{} is not between 0 and {} seconds", secs, MAX_TIMEOUT_SECS),
                ));
            }
        }
        Ok(())
    }

    pub fn blanking_timeout(&self) -> Duration {
        timeout(self.blanking_timeout_secs)
    }

    pub fn drop_timeout(&self) -> Duration {
        timeout(self.drop_timeout_secs)
    }

    /// Quick-search timeout in wire units.
    pub fn scan_timeout_units(&self) -> u8 {
        search_timeout_units(self.scan_timeout_secs)
    }

    /// Waiting/lost search timeout in wire units.
    pub fn lost_timeout_units(&self) -> u8 {
        search_timeout_units(self.lost_timeout_secs)
    }
}

// out of range values only get here through struct literals; clamp them
fn timeout(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs.clamp(0.0, MAX_TIMEOUT_SECS))
}

/// Convert seconds to 2.5 s search-timeout units, saturating at the wire width.
pub fn search_timeout_units(secs: f64) -> u8 {
    (secs / SEARCH_TIMEOUT_UNIT_SECS).clamp(0.0, u8::MAX as f64) as u8
}

/// Everything a host application configures: channel tunables plus sensor
/// registry overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub channel: ChannelConfig,
    pub sensors: Vec<SensorType>,
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml_ng::from_str(yaml)?;
        settings.channel.validate()?;
        Ok(settings)
    }

    /// Build the registry these settings describe.
    pub fn registry(&self) -> Result<SensorRegistry> {
        SensorRegistry::with_overrides(self.sensors.clone())
    }
}

/// Load settings from a YAML file.
pub fn load_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Settings> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    let settings = Settings::from_yaml(&yaml)
        .with_context(|| format!("parsing settings in {}", path.display()))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceClass;

    #[test]
    fn defaults_match_the_protocol_timings() {
        let config = ChannelConfig::default();
        assert_eq!(config.blanking_timeout(), Duration::from_secs(2));
        assert_eq!(config.scan_timeout_units(), 4);
        assert_eq!(config.lost_timeout_units(), 12);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ChannelConfig::from_yaml("srm_offset: 512.0\n").unwrap();
        assert_eq!(config.srm_offset, 512.0);
        assert_eq!(config.power_dropout_limit, 4);
    }

    #[test]
    fn timeout_units_saturate() {
        assert_eq!(search_timeout_units(1000.0), 255);
        assert_eq!(search_timeout_units(-5.0), 0);
    }

    #[test]
    fn settings_build_a_registry() {
        let yaml = r#"
channel:
  burst_capacity: 64
sensors:
  - class: heart_rate
    device_type: 120
    network: 0
    period: 16140
    frequency: 57
    name: Heartrate (2Hz)
    suffix: h
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.channel.burst_capacity, 64);
        let registry = settings.registry().unwrap();
        assert_eq!(registry.get(DeviceClass::HeartRate).period, 16140);
    }

    #[test]
    fn load_file_reports_the_path() {
        let missing = std::env::temp_dir().join("crankset-no-such-settings.yaml");
        let err = load_file(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("crankset-no-such-settings.yaml"));
    }

    #[test]
    fn load_file_reads_yaml() {
        let file = format!("crankset-settings-{}.yaml", std::process::id());
        let path = std::env::temp_dir().join(file);
        std::fs::write(&path, "channel:\n  drop_timeout_secs: 4.0\n").unwrap();
        let settings = load_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(settings.channel.drop_timeout(), Duration::from_secs(4));
    }

    #[test]
    fn negative_timeouts_are_rejected() {
        let err = Settings::from_yaml("channel:\n  blanking_timeout_secs: -1.0\n").unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("blanking_timeout_secs"));

        assert!(ChannelConfig::from_yaml("drop_timeout_secs: -2.0\n").is_err());
        assert!(ChannelConfig::from_yaml("scan_timeout_secs: .nan\n").is_err());
        assert!(ChannelConfig::from_yaml("lost_timeout_secs: 1.0e300\n").is_err());
    }

    #[test]
    fn load_file_rejects_invalid_timeouts() {
        let file = format!("crankset-bad-settings-{}.yaml", std::process::id());
        let path = std::env::temp_dir().join(file);
        std::fs::write(&path, "channel:\n  drop_timeout_secs: -2.0\n").unwrap();
        let err = load_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(format!("{:#}", err).contains("drop_timeout_secs"));
    }

    #[test]
    fn out_of_range_literals_clamp_instead_of_panicking() {
        let config = ChannelConfig {
            blanking_timeout_secs: -1.0,
            drop_timeout_secs: f64::NAN,
            ..ChannelConfig::default()
        };
        assert_eq!(config.blanking_timeout(), Duration::ZERO);
        assert_eq!(config.drop_timeout(), Duration::ZERO);

        let channel = crate::Channel::new(
            0,
            std::sync::Arc::new(crate::SensorRegistry::ant_sport()),
            config,
            crate::NullSink,
        );
        assert!(channel.is_blanked());
    }
}
