//! Frame builders shared by unit tests and benchmarks
//!
//! Everything here produces checksummed wire bytes, exactly as a transceiver
//! would hand them over, so tests exercise the full decode path.

#![cfg(any(test, feature = "benchmark"))]

use std::time::Instant;

use crate::channel::Channel;
use crate::codec::{Command, Frame};
use crate::protocol::{EVENT_MESSAGE_ID, data_page, event_code, message_id};
use crate::sink::TelemetrySink;
use crate::types::DeviceClass;

pub fn broadcast_frame(channel: u8, data: [u8; 8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9);
    payload.push(channel);
    payload.extend_from_slice(&data);
    Frame::new(message_id::BROADCAST_DATA, payload).encode()
}

/// Successful response to the command with `acked`.
pub fn ack_frame(channel: u8, acked: u8) -> Vec<u8> {
    let payload = vec![channel, acked, event_code::RESPONSE_NO_ERROR];
    Frame::new(message_id::CHANNEL_EVENT, payload).encode()
}

/// Unsolicited channel event.
pub fn event_frame(channel: u8, code: u8) -> Vec<u8> {
    Frame::new(message_id::CHANNEL_EVENT, vec![channel, EVENT_MESSAGE_ID, code]).encode()
}

pub fn channel_id_frame(channel: u8, device_number: u16, device_type: u8) -> Vec<u8> {
    let [lo, hi] = device_number.to_le_bytes();
    Frame::new(message_id::CHANNEL_ID, vec![channel, lo, hi, device_type, 0x05]).encode()
}

pub fn burst_frame(channel: u8, sequence: u8, last: bool, data: &[u8]) -> Vec<u8> {
    let mut header = (channel & 0x1F) | ((sequence & 0x03) << 5);
    if last {
        header |= 0x80;
    }
    let mut payload = vec![header];
    payload.extend_from_slice(data);
    Frame::new(message_id::BURST_DATA, payload).encode()
}

pub fn standard_power_page(event_count: u8, instant_power: u16) -> [u8; 8] {
    let [p_lo, p_hi] = instant_power.to_le_bytes();
    [data_page::STANDARD_POWER, event_count, 0xFF, 90, 0, 0, p_lo, p_hi]
}

pub fn crank_torque_page(event_count: u8, period: u16, torque: u16) -> [u8; 8] {
    let [period_lo, period_hi] = period.to_le_bytes();
    let [torque_lo, torque_hi] = torque.to_le_bytes();
    [data_page::CRANK_TORQUE, event_count, 0, 0xFF, period_lo, period_hi, torque_lo, torque_hi]
}

pub fn heart_rate_page(measurement_time: u16, beat_count: u8, heart_rate: u8) -> [u8; 8] {
    let [lo, hi] = measurement_time.to_le_bytes();
    [0x04, 0, 0, 0, lo, hi, beat_count, heart_rate]
}

pub fn manufacturer_page(
    hardware_revision: u8,
    manufacturer_id: u16,
    model_number: u16,
) -> [u8; 8] {
    let [m_lo, m_hi] = manufacturer_id.to_le_bytes();
    let [n_lo, n_hi] = model_number.to_le_bytes();
    [data_page::MANUFACTURER_INFO, 0xFF, 0xFF, hardware_revision, m_lo, m_hi, n_lo, n_hi]
}

pub fn product_page(software_revision: u8, serial_number: u32) -> [u8; 8] {
    let [s0, s1, s2, s3] = serial_number.to_le_bytes();
    [data_page::PRODUCT_INFO, 0xFF, 0xFF, software_revision, s0, s1, s2, s3]
}

/// Open `channel` for `class` and acknowledge every configuration command
/// until it is open. Returns the commands that were sent.
pub fn open_channel<S: TelemetrySink>(
    channel: &mut Channel<S>,
    device_number: u16,
    class: DeviceClass,
    now: Instant,
) -> Vec<Command> {
    channel.open(device_number, class);
    acknowledge_pending(channel, now)
}

/// Acknowledge queued commands, and whatever they queue in turn.
///
/// Panics if an acknowledgement is rejected.
pub fn acknowledge_pending<S: TelemetrySink>(
    channel: &mut Channel<S>,
    now: Instant,
) -> Vec<Command> {
    let number = channel.number();
    let mut sent = Vec::new();
    loop {
        let commands = channel.take_commands();
        if commands.is_empty() {
            return sent;
        }
        for command in commands {
            channel.receive(&ack_frame(number, command.message_id()), now).expect("ack");
            sent.push(command);
        }
    }
}
