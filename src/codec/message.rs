//! Inbound message decoding
//!
//! A frame is decoded once, at the boundary, into an [`AntMessage`] whose
//! variants carry only the fields valid for that message category. Broadcast
//! payloads depend on what is on the other end of the channel, so decoding
//! takes the channel's [`DeviceClass`].

use serde::{Deserialize, Serialize};

use super::Frame;
use crate::protocol::{DATA_PAYLOAD_SIZE, EVENT_MESSAGE_ID, data_page, event_code, message_id};
use crate::types::DeviceClass;
use crate::{AntError, Result};

/// Response or event reported for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: u8,
    /// Id of the acknowledged command, or 1 for an unsolicited event.
    pub message_id: u8,
    pub code: u8,
}

impl ChannelEvent {
    /// Unsolicited channel event rather than a command response.
    pub fn is_event(&self) -> bool {
        self.message_id == EVENT_MESSAGE_ID
    }

    pub fn is_response_no_error(&self) -> bool {
        !self.is_event() && self.code == event_code::RESPONSE_NO_ERROR
    }

    pub fn description(&self) -> &'static str {
        crate::protocol::describe_event_code(self.code)
    }
}

/// Channel id notification: who is on the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdent {
    pub channel: u8,
    pub device_number: u16,
    pub device_type: u8,
    pub transmission_type: u8,
}

/// One fragment of a burst transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstFragment {
    pub channel: u8,
    /// Two-bit rolling sequence token.
    pub sequence: u8,
    /// Set on the final fragment of a transfer.
    pub last: bool,
    pub data: Vec<u8>,
}

/// Common data page 80.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerInfo {
    pub hardware_revision: u8,
    pub manufacturer_id: u16,
    pub model_number: u16,
}

/// Common data page 81.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub software_revision: u8,
    pub serial_number: u32,
}

/// Device-class specific telemetry carried by a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Telemetry {
    StandardPower {
        event_count: u8,
        instant_cadence: u8,
        accumulated_power: u16,
        instant_power: u16,
    },
    WheelTorque { event_count: u8, wheel_ticks: u8, instant_cadence: u8, period: u16, torque: u16 },
    CrankTorque { event_count: u8, crank_ticks: u8, instant_cadence: u8, period: u16, torque: u16 },
    /// SRM style page, fields are big-endian on the wire.
    CrankTorqueFrequency { event_count: u8, slope: u16, period: u16, torque: u16 },
    HeartRate { measurement_time: u16, beat_count: u8, heart_rate: u8 },
    Cadence { measurement_time: u16, revolutions: u16 },
    Speed { measurement_time: u16, revolutions: u16 },
    SpeedCadence {
        crank_time: u16,
        crank_revolutions: u16,
        wheel_time: u16,
        wheel_revolutions: u16,
    },
    /// Page this crate has no decoder for (or a class that is not interpreted).
    Unrecognised { page: u8 },
}

impl Telemetry {
    pub fn decode(class: DeviceClass, data: &[u8; DATA_PAYLOAD_SIZE]) -> Self {
        let le = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let be = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);

        match class {
            c if c.is_power() => match data[0] {
                data_page::STANDARD_POWER => Telemetry::StandardPower {
                    event_count: data[1],
                    instant_cadence: data[3],
                    accumulated_power: le(4),
                    instant_power: le(6),
                },
                data_page::WHEEL_TORQUE => Telemetry::WheelTorque {
                    event_count: data[1],
                    wheel_ticks: data[2],
                    instant_cadence: data[3],
                    period: le(4),
                    torque: le(6),
                },
                data_page::CRANK_TORQUE => Telemetry::CrankTorque {
                    event_count: data[1],
                    crank_ticks: data[2],
                    instant_cadence: data[3],
                    period: le(4),
                    torque: le(6),
                },
                data_page::CRANK_TORQUE_FREQUENCY => Telemetry::CrankTorqueFrequency {
                    event_count: data[1],
                    slope: be(2),
                    period: be(4),
                    torque: be(6),
                },
                page => Telemetry::Unrecognised { page },
            },
            DeviceClass::HeartRate => Telemetry::HeartRate {
                measurement_time: le(4),
                beat_count: data[6],
                heart_rate: data[7],
            },
            DeviceClass::Cadence => {
                Telemetry::Cadence { measurement_time: le(4), revolutions: le(6) }
            }
            DeviceClass::Speed => Telemetry::Speed { measurement_time: le(4), revolutions: le(6) },
            DeviceClass::SpeedCadence => Telemetry::SpeedCadence {
                crank_time: le(0),
                crank_revolutions: le(2),
                wheel_time: le(4),
                wheel_revolutions: le(6),
            },
            _ => Telemetry::Unrecognised { page: data[0] },
        }
    }

    /// Whether two samples can be differenced.
    pub fn same_kind(&self, other: &Telemetry) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Broadcast payload, keyed by data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Broadcast {
    Manufacturer(ManufacturerInfo),
    Product(ProductInfo),
    Telemetry(Telemetry),
}

impl Broadcast {
    /// Common pages are only recognised on power channels: the other
    /// profiles use byte 0 for measurement data.
    pub fn decode(class: DeviceClass, data: &[u8; DATA_PAYLOAD_SIZE]) -> Self {
        if class.is_power() {
            match data[0] {
                data_page::MANUFACTURER_INFO => {
                    return Broadcast::Manufacturer(ManufacturerInfo {
                        hardware_revision: data[3],
                        manufacturer_id: u16::from_le_bytes([data[4], data[5]]),
                        model_number: u16::from_le_bytes([data[6], data[7]]),
                    });
                }
                data_page::PRODUCT_INFO => {
                    return Broadcast::Product(ProductInfo {
                        software_revision: data[3],
                        serial_number: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
                    });
                }
                _ => {}
            }
        }

        Broadcast::Telemetry(Telemetry::decode(class, data))
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AntMessage {
    ChannelEvent(ChannelEvent),
    Broadcast { channel: u8, data: Broadcast },
    Acknowledged { channel: u8, data: [u8; DATA_PAYLOAD_SIZE] },
    ChannelId(ChannelIdent),
    Burst(BurstFragment),
    ChannelStatus { channel: u8, status: u8 },
    Version(String),
    Capabilities { max_channels: u8, max_networks: u8 },
    SerialNumber(u32),
    Startup { reason: u8 },
    /// Message id without a decoder. Callers ignore these.
    Unknown { message_id: u8 },
}

impl AntMessage {
    /// Decode raw wire bytes.
    pub fn decode(raw: &[u8], class: DeviceClass) -> Result<Self> {
        let frame = Frame::parse(raw)?;
        Self::from_frame(&frame, class)
    }

    /// Decode an already framed message.
    pub fn from_frame(frame: &Frame, class: DeviceClass) -> Result<Self> {
        let p = frame.payload.as_slice();

        let message = match frame.message_id {
            message_id::CHANNEL_EVENT => {
                require(p, 3)?;
                let event = ChannelEvent { channel: p[0], message_id: p[1], code: p[2] };
                AntMessage::ChannelEvent(event)
            }
            message_id::BROADCAST_DATA => {
                let data = data_bytes(p)?;
                AntMessage::Broadcast { channel: p[0], data: Broadcast::decode(class, &data) }
            }
            message_id::ACK_DATA => {
                let data = data_bytes(p)?;
                AntMessage::Acknowledged { channel: p[0], data }
            }
            message_id::BURST_DATA => {
                require(p, 1)?;
                AntMessage::Burst(BurstFragment {
                    channel: p[0] & 0x1F,
                    sequence: (p[0] >> 5) & 0x03,
                    last: p[0] & 0x80 != 0,
                    data: p[1..].to_vec(),
                })
            }
            message_id::CHANNEL_ID => {
                require(p, 5)?;
                AntMessage::ChannelId(ChannelIdent {
                    channel: p[0],
                    device_number: u16::from_le_bytes([p[1], p[2]]),
                    device_type: p[3],
                    transmission_type: p[4],
                })
            }
            message_id::CHANNEL_STATUS => {
                require(p, 2)?;
                AntMessage::ChannelStatus { channel: p[0], status: p[1] }
            }
            message_id::VERSION => {
                let end = p.iter().position(|&b| b == 0).unwrap_or(p.len());
                AntMessage::Version(String::from_utf8_lossy(&p[..end]).into_owned())
            }
            message_id::CAPABILITIES => {
                require(p, 2)?;
                AntMessage::Capabilities { max_channels: p[0], max_networks: p[1] }
            }
            message_id::SERIAL_NUMBER => {
                require(p, 4)?;
                AntMessage::SerialNumber(u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
            }
            message_id::STARTUP => {
                require(p, 1)?;
                AntMessage::Startup { reason: p[0] }
            }
            other => AntMessage::Unknown { message_id: other },
        };

        Ok(message)
    }

    /// Channel the message belongs to, for channel-scoped categories.
    pub fn channel(&self) -> Option<u8> {
        match self {
            AntMessage::ChannelEvent(event) => Some(event.channel),
            AntMessage::Broadcast { channel, .. } => Some(*channel),
            AntMessage::Acknowledged { channel, .. } => Some(*channel),
            AntMessage::ChannelId(ident) => Some(ident.channel),
            AntMessage::Burst(fragment) => Some(fragment.channel),
            AntMessage::ChannelStatus { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

fn require(payload: &[u8], len: usize) -> Result<()> {
    if payload.len() < len {
        return Err(AntError::LengthMismatch { declared: len, actual: payload.len() });
    }
    Ok(())
}

// channel byte followed by the 8 data bytes; extended trailers are ignored
fn data_bytes(payload: &[u8]) -> Result<[u8; DATA_PAYLOAD_SIZE]> {
    require(payload, DATA_PAYLOAD_SIZE + 1)?;
    let mut data = [0u8; DATA_PAYLOAD_SIZE];
    data.copy_from_slice(&payload[1..=DATA_PAYLOAD_SIZE]);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcast(channel: u8, data: [u8; 8]) -> Vec<u8> {
        let mut payload = vec![channel];
        payload.extend_from_slice(&data);
        Frame::new(message_id::BROADCAST_DATA, payload).encode()
    }

    fn decode_telemetry(class: DeviceClass, data: [u8; 8]) -> Telemetry {
        match AntMessage::decode(&broadcast(0, data), class).unwrap() {
            AntMessage::Broadcast { data: Broadcast::Telemetry(t), .. } => t,
            other => panic!("expected telemetry, got {:?}", other),
        }
    }

    #[test]
    fn decodes_standard_power() {
        let t = decode_telemetry(DeviceClass::Power, [0x10, 7, 0xFF, 90, 0x10, 0x27, 0xFA, 0x00]);
        assert_eq!(
            t,
            Telemetry::StandardPower {
                event_count: 7,
                instant_cadence: 90,
                accumulated_power: 10000,
                instant_power: 250
            }
        );
    }

    #[test]
    fn decodes_srm_big_endian() {
        let t = decode_telemetry(DeviceClass::Power, [0x20, 3, 0x01, 0x2C, 0x07, 0xD0, 0x12, 0x34]);
        let expected = Telemetry::CrankTorqueFrequency {
            event_count: 3,
            slope: 300,
            period: 2000,
            torque: 0x1234,
        };
        assert_eq!(t, expected);
    }

    #[test]
    fn decodes_heart_rate() {
        let t = decode_telemetry(DeviceClass::HeartRate, [0x84, 0, 0, 0, 0x00, 0x04, 17, 142]);
        let expected =
            Telemetry::HeartRate { measurement_time: 1024, beat_count: 17, heart_rate: 142 };
        assert_eq!(t, expected);
    }

    #[test]
    fn decodes_speed_and_cadence() {
        let t = decode_telemetry(DeviceClass::SpeedCadence, [0x00, 0x04, 2, 0, 0x00, 0x08, 5, 0]);
        assert_eq!(
            t,
            Telemetry::SpeedCadence {
                crank_time: 1024,
                crank_revolutions: 2,
                wheel_time: 2048,
                wheel_revolutions: 5
            }
        );
    }

    #[test]
    fn common_pages_only_on_power_channels() {
        let data = [0x50, 0xFF, 0xFF, 10, 7, 0, 1, 0];
        match AntMessage::decode(&broadcast(0, data), DeviceClass::Quarq).unwrap() {
            AntMessage::Broadcast { data: Broadcast::Manufacturer(info), .. } => {
                assert_eq!(info.hardware_revision, 10);
                assert_eq!(info.manufacturer_id, 7);
                assert_eq!(info.model_number, 1);
            }
            other => panic!("expected manufacturer page, got {:?}", other),
        }

        // 0x50 is just a time LSB for a speed+cadence sensor
        let t = decode_telemetry(DeviceClass::SpeedCadence, data);
        assert!(matches!(t, Telemetry::SpeedCadence { crank_time: 0xFF50, .. }));
    }

    #[test]
    fn unknown_power_page_is_unrecognised() {
        let t = decode_telemetry(DeviceClass::Power, [0x13, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(t, Telemetry::Unrecognised { page: 0x13 });
    }

    #[test]
    fn decodes_channel_event_and_id() {
        let event = Frame::new(message_id::CHANNEL_EVENT, vec![2, 0x42, 0]).encode();
        let decoded = AntMessage::decode(&event, DeviceClass::Unused).unwrap();
        match decoded {
            AntMessage::ChannelEvent(e) => {
                assert!(e.is_response_no_error());
                assert_eq!(e.message_id, 0x42);
            }
            other => panic!("unexpected {:?}", other),
        }

        let id = Frame::new(message_id::CHANNEL_ID, vec![1, 0x39, 0x30, 0x0B, 0x05]).encode();
        let decoded = AntMessage::decode(&id, DeviceClass::Power).unwrap();
        assert_eq!(
            decoded,
            AntMessage::ChannelId(ChannelIdent {
                channel: 1,
                device_number: 12345,
                device_type: 0x0B,
                transmission_type: 5
            })
        );
        assert_eq!(decoded.channel(), Some(1));
    }

    #[test]
    fn decodes_burst_header_bits() {
        // channel 3, sequence 2, last
        let payload = vec![0x80 | (2 << 5) | 3, 1, 2, 3, 4, 5, 6, 7, 8];
        let raw = Frame::new(message_id::BURST_DATA, payload).encode();
        match AntMessage::decode(&raw, DeviceClass::Power).unwrap() {
            AntMessage::Burst(f) => {
                assert_eq!(f.channel, 3);
                assert_eq!(f.sequence, 2);
                assert!(f.last);
                assert_eq!(f.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_ids_are_not_errors() {
        let raw = Frame::new(0x99, vec![1, 2, 3]).encode();
        assert_eq!(
            AntMessage::decode(&raw, DeviceClass::Power).unwrap(),
            AntMessage::Unknown { message_id: 0x99 }
        );
    }

    #[test]
    fn short_broadcast_is_malformed() {
        let raw = Frame::new(message_id::BROADCAST_DATA, vec![0, 1, 2]).encode();
        let err = AntMessage::decode(&raw, DeviceClass::Power).unwrap_err();
        assert!(err.is_malformed_frame());
    }

    #[test]
    fn decodes_version_string() {
        let raw = Frame::new(message_id::VERSION, b"AP2USB1.05\0".to_vec()).encode();
        assert_eq!(
            AntMessage::decode(&raw, DeviceClass::Unused).unwrap(),
            AntMessage::Version("AP2USB1.05".to_string())
        );
    }
}
