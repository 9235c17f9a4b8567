//! Device classes a channel can be opened for

use serde::{Deserialize, Serialize};

/// The category of sensor a channel talks to.
///
/// Determines the channel parameters taken from the registry and which
/// decode formula applies to broadcast telemetry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    #[default]
    Unused,
    HeartRate,
    Power,
    Speed,
    Cadence,
    SpeedCadence,
    /// Quarq private channel (slow rate).
    Quarq,
    /// Quarq private channel (fast rate).
    FastQuarq,
    /// Fast Quarq channel using the pre-1.8 device type.
    FastQuarqNew,
    /// Wildcard control channel, never interpreted.
    Control,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 10] = [
        DeviceClass::Unused,
        DeviceClass::HeartRate,
        DeviceClass::Power,
        DeviceClass::Speed,
        DeviceClass::Cadence,
        DeviceClass::SpeedCadence,
        DeviceClass::Quarq,
        DeviceClass::FastQuarq,
        DeviceClass::FastQuarqNew,
        DeviceClass::Control,
    ];

    /// Power meters and the Quarq channels share the power page decoders.
    pub fn is_power(self) -> bool {
        matches!(
            self,
            DeviceClass::Power
                | DeviceClass::Quarq
                | DeviceClass::FastQuarq
                | DeviceClass::FastQuarqNew
        )
    }

    /// Whether broadcasts on this class produce telemetry.
    pub fn is_interpreted(self) -> bool {
        !matches!(self, DeviceClass::Unused | DeviceClass::Control)
    }
}
