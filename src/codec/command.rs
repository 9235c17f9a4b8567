//! Outbound configuration commands

use serde::{Deserialize, Serialize};

use super::Frame;
use crate::protocol::{calibration, data_page, message_id};

/// A command for the transceiver, keyed by channel number where relevant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    ResetSystem,
    AssignChannel { channel: u8, channel_type: u8, network: u8 },
    UnassignChannel { channel: u8 },
    SetChannelId { channel: u8, device_number: u16, device_type: u8, transmission_type: u8 },
    /// Timeout in units of 2.5 seconds.
    SetSearchTimeout { channel: u8, timeout: u8 },
    SetChannelPeriod { channel: u8, period: u16 },
    SetChannelFrequency { channel: u8, frequency: u8 },
    SetNetworkKey { network: u8, key: [u8; 8] },
    SetAutoCalibrate { channel: u8, auto_zero: bool },
    RequestCalibrate { channel: u8 },
    RequestMessage { channel: u8, message_id: u8 },
    OpenChannel { channel: u8 },
    CloseChannel { channel: u8 },
}

impl Command {
    /// Message id this command is sent with, and acknowledged by.
    pub fn message_id(&self) -> u8 {
        match self {
            Command::ResetSystem => message_id::SYSTEM_RESET,
            Command::AssignChannel { .. } => message_id::ASSIGN_CHANNEL,
            Command::UnassignChannel { .. } => message_id::UNASSIGN_CHANNEL,
            Command::SetChannelId { .. } => message_id::CHANNEL_ID,
            Command::SetSearchTimeout { .. } => message_id::SEARCH_TIMEOUT,
            Command::SetChannelPeriod { .. } => message_id::CHANNEL_PERIOD,
            Command::SetChannelFrequency { .. } => message_id::CHANNEL_FREQUENCY,
            Command::SetNetworkKey { .. } => message_id::SET_NETWORK_KEY,
            Command::SetAutoCalibrate { .. } | Command::RequestCalibrate { .. } => {
                message_id::ACK_DATA
            }
            Command::RequestMessage { .. } => message_id::REQUEST_MESSAGE,
            Command::OpenChannel { .. } => message_id::OPEN_CHANNEL,
            Command::CloseChannel { .. } => message_id::CLOSE_CHANNEL,
        }
    }

    /// Channel the command addresses, if any.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            Command::ResetSystem | Command::SetNetworkKey { .. } => None,
            Command::AssignChannel { channel, .. }
            | Command::UnassignChannel { channel }
            | Command::SetChannelId { channel, .. }
            | Command::SetSearchTimeout { channel, .. }
            | Command::SetChannelPeriod { channel, .. }
            | Command::SetChannelFrequency { channel, .. }
            | Command::SetAutoCalibrate { channel, .. }
            | Command::RequestCalibrate { channel }
            | Command::RequestMessage { channel, .. }
            | Command::OpenChannel { channel }
            | Command::CloseChannel { channel } => Some(channel),
        }
    }

    pub fn to_frame(&self) -> Frame {
        let payload = match *self {
            Command::ResetSystem => vec![0x00],
            Command::AssignChannel { channel, channel_type, network } => {
                vec![channel, channel_type, network]
            }
            Command::UnassignChannel { channel } => vec![channel],
            Command::SetChannelId { channel, device_number, device_type, transmission_type } => {
                let [lo, hi] = device_number.to_le_bytes();
                vec![channel, lo, hi, device_type, transmission_type]
            }
            Command::SetSearchTimeout { channel, timeout } => vec![channel, timeout],
            Command::SetChannelPeriod { channel, period } => {
                let [lo, hi] = period.to_le_bytes();
                vec![channel, lo, hi]
            }
            Command::SetChannelFrequency { channel, frequency } => vec![channel, frequency],
            Command::SetNetworkKey { network, key } => {
                let mut payload = Vec::with_capacity(9);
                payload.push(network);
                payload.extend_from_slice(&key);
                payload
            }
            Command::SetAutoCalibrate { channel, auto_zero } => {
                let status =
                    if auto_zero { calibration::AUTO_ZERO_ON } else { calibration::AUTO_ZERO_OFF };
                let mut payload = vec![
                    channel,
                    data_page::CALIBRATION,
                    calibration::AUTO_ZERO_CONFIG,
                    status,
                ];
                payload.resize(9, calibration::RESERVED);
                payload
            }
            Command::RequestCalibrate { channel } => {
                let mut payload =
                    vec![channel, data_page::CALIBRATION, calibration::REQUEST_MANUAL_ZERO];
                payload.resize(9, calibration::RESERVED);
                payload
            }
            Command::RequestMessage { channel, message_id } => vec![channel, message_id],
            Command::OpenChannel { channel } => vec![channel],
            Command::CloseChannel { channel } => vec![channel],
        };

        Frame::new(self.message_id(), payload)
    }

    /// Checksummed wire bytes for this command.
    pub fn encode(&self) -> Vec<u8> {
        self.to_frame().encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SPORT_NETWORK_KEY;

    #[test]
    fn set_channel_id_is_little_endian() {
        let command = Command::SetChannelId {
            channel: 1,
            device_number: 0x1234,
            device_type: 0x78,
            transmission_type: 0,
        };
        let frame = command.to_frame();
        assert_eq!(frame.message_id, 0x51);
        assert_eq!(frame.payload, vec![1, 0x34, 0x12, 0x78, 0]);
    }

    #[test]
    fn channel_period_bytes() {
        let frame = Command::SetChannelPeriod { channel: 0, period: 8182 }.to_frame();
        assert_eq!(frame.payload, vec![0, 0xF6, 0x1F]);
    }

    #[test]
    fn network_key_payload() {
        let frame = Command::SetNetworkKey { network: 1, key: SPORT_NETWORK_KEY }.to_frame();
        assert_eq!(frame.message_id, 0x46);
        assert_eq!(frame.payload.len(), 9);
        assert_eq!(frame.payload[0], 1);
        assert_eq!(&frame.payload[1..], &SPORT_NETWORK_KEY);
    }

    #[test]
    fn calibration_requests_are_acknowledged_data() {
        let auto = Command::SetAutoCalibrate { channel: 2, auto_zero: true }.to_frame();
        assert_eq!(auto.message_id, 0x4F);
        assert_eq!(auto.payload, vec![2, 0x01, 0xAB, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        let manual = Command::RequestCalibrate { channel: 2 }.to_frame();
        assert_eq!(manual.payload, vec![2, 0x01, 0xAA, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn channel_addressing() {
        assert_eq!(Command::ResetSystem.channel(), None);
        assert_eq!(Command::OpenChannel { channel: 3 }.channel(), Some(3));
        assert_eq!(Command::RequestMessage { channel: 4, message_id: 0x51 }.channel(), Some(4));
    }

    #[test]
    fn encoded_commands_parse_back() {
        let commands = [
            Command::ResetSystem,
            Command::AssignChannel { channel: 0, channel_type: 0, network: 1 },
            Command::SetSearchTimeout { channel: 0, timeout: 4 },
            Command::CloseChannel { channel: 0 },
        ];
        for command in commands {
            let frame = Frame::parse(&command.encode()).unwrap();
            assert_eq!(frame, command.to_frame());
        }
    }
}
