//! Device-type registry
//!
//! Per device class: the wire device type, network slot, channel period,
//! RF frequency, a descriptive name and the single character suffix used in
//! channel id strings (`"12345p"`). The registry is built once and shared
//! read-only between channels.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::{DEFAULT_NETWORK_NUMBER, SPORT_NETWORK_NUMBER, quarq, sport};
use crate::types::DeviceClass;
use crate::{AntError, Result};

/// Channel parameters for one device class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorType {
    pub class: DeviceClass,
    pub device_type: u8,
    pub network: u8,
    pub period: u16,
    pub frequency: u8,
    pub name: String,
    pub suffix: char,
}

impl SensorType {
    fn new(
        class: DeviceClass,
        device_type: u8,
        network: u8,
        period: u16,
        frequency: u8,
        name: &str,
        suffix: char,
    ) -> Self {
        Self { class, device_type, network, period, frequency, name: name.to_string(), suffix }
    }
}

/// Lookup table from [`DeviceClass`] to [`SensorType`].
///
/// Always holds an entry for every class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRegistry {
    // indexed by `DeviceClass as usize`, in `DeviceClass::ALL` order
    types: Vec<SensorType>,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::ant_sport()
    }
}

impl SensorRegistry {
    /// The built-in ANT+ sport table.
    pub fn ant_sport() -> Self {
        use DeviceClass::*;

        let types = vec![
            SensorType::new(Unused, 0, 0, 0, 0, "Unused", '?'),
            SensorType::new(
                HeartRate,
                sport::HEART_RATE_TYPE,
                SPORT_NETWORK_NUMBER,
                sport::HEART_RATE_PERIOD,
                sport::FREQUENCY,
                "Heartrate",
                'h',
            ),
            SensorType::new(
                Power,
                sport::POWER_TYPE,
                SPORT_NETWORK_NUMBER,
                sport::POWER_PERIOD,
                sport::FREQUENCY,
                "Power",
                'p',
            ),
            SensorType::new(
                Speed,
                sport::SPEED_TYPE,
                SPORT_NETWORK_NUMBER,
                sport::SPEED_PERIOD,
                sport::FREQUENCY,
                "Speed",
                's',
            ),
            SensorType::new(
                Cadence,
                sport::CADENCE_TYPE,
                SPORT_NETWORK_NUMBER,
                sport::CADENCE_PERIOD,
                sport::FREQUENCY,
                "Cadence",
                'c',
            ),
            SensorType::new(
                SpeedCadence,
                sport::SPEED_CADENCE_TYPE,
                SPORT_NETWORK_NUMBER,
                sport::SPEED_CADENCE_PERIOD,
                sport::FREQUENCY,
                "Speed + Cadence",
                'd',
            ),
            SensorType::new(
                Quarq,
                quarq::TYPE,
                DEFAULT_NETWORK_NUMBER,
                quarq::PERIOD,
                quarq::FREQUENCY,
                "Quarq Channel",
                'Q',
            ),
            SensorType::new(
                FastQuarq,
                quarq::TYPE,
                DEFAULT_NETWORK_NUMBER,
                quarq::FAST_PERIOD,
                quarq::FREQUENCY,
                "Fast Quarq",
                'q',
            ),
            SensorType::new(
                FastQuarqNew,
                quarq::TYPE_BEFORE_1_8,
                DEFAULT_NETWORK_NUMBER,
                quarq::FAST_PERIOD,
                quarq::FREQUENCY,
                "Fast Quarq New",
                'n',
            ),
            // wildcard device type: matches whatever answers
            SensorType::new(
                Control,
                0,
                SPORT_NETWORK_NUMBER,
                sport::POWER_PERIOD,
                sport::FREQUENCY,
                "Control",
                'x',
            ),
        ];

        Self { types }
    }

    /// Start from the built-in table and replace the listed classes.
    pub fn with_overrides(overrides: Vec<SensorType>) -> Result<Self> {
        let mut registry = Self::ant_sport();
        for sensor in overrides {
            if sensor.class == DeviceClass::Unused {
                return Err(AntError::config("sensor registry", "the unused entry is fixed"));
            }
            debug!(class = ?sensor.class, name = %sensor.name, "Overriding sensor type");
            let index = sensor.class as usize;
            registry.types[index] = sensor;
        }
        Ok(registry)
    }

    /// Parse a YAML list of overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overrides: Vec<SensorType> = serde_yaml_ng::from_str(yaml)?;
        Self::with_overrides(overrides)
    }

    pub fn get(&self, class: DeviceClass) -> &SensorType {
        &self.types[class as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorType> {
        self.types.iter()
    }

    /// Reverse lookup by descriptive name.
    pub fn class_for_name(&self, name: &str) -> Option<DeviceClass> {
        self.types.iter().find(|t| t.name == name).map(|t| t.class)
    }

    /// Human readable channel id: device number followed by the class suffix,
    /// or `"none"` for an unused channel.
    pub fn channel_id(&self, class: DeviceClass, device_number: u16) -> String {
        if class == DeviceClass::Unused {
            return "none".to_string();
        }
        format!("{}{}", device_number, self.get(class).suffix)
    }
}
