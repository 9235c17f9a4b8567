//! Constants for the ANT serial message protocol and the ANT+ sport profiles
//!
//! Message ids and event codes come from the ANT message protocol document;
//! data pages and channel parameters from the ANT+ device profiles.

/// First byte of every serial frame.
pub const SYNC: u8 = 0xA4;

/// Data payload carried by broadcast, acknowledged and burst messages.
pub const DATA_PAYLOAD_SIZE: usize = 8;

/// ANT+ managed network key.
pub const SPORT_NETWORK_KEY: [u8; 8] = [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];

/// Network slot the sport key is loaded into.
pub const SPORT_NETWORK_NUMBER: u8 = 1;

/// Public network slot.
pub const DEFAULT_NETWORK_NUMBER: u8 = 0;

/// Receive (slave) channel type for assign-channel.
pub const CHANNEL_TYPE_RECEIVE: u8 = 0x00;

/// Set on the device type of set-channel-id to request pairing.
pub const PAIRING_BIT: u8 = 0x80;

/// Search timeouts are expressed in units of 2.5 seconds.
pub const SEARCH_TIMEOUT_UNIT_SECS: f64 = 2.5;

pub mod message_id {
    pub const CHANNEL_EVENT: u8 = 0x40;
    pub const UNASSIGN_CHANNEL: u8 = 0x41;
    pub const ASSIGN_CHANNEL: u8 = 0x42;
    pub const CHANNEL_PERIOD: u8 = 0x43;
    pub const SEARCH_TIMEOUT: u8 = 0x44;
    pub const CHANNEL_FREQUENCY: u8 = 0x45;
    pub const SET_NETWORK_KEY: u8 = 0x46;
    pub const TX_POWER: u8 = 0x47;
    pub const SYSTEM_RESET: u8 = 0x4A;
    pub const OPEN_CHANNEL: u8 = 0x4B;
    pub const CLOSE_CHANNEL: u8 = 0x4C;
    pub const REQUEST_MESSAGE: u8 = 0x4D;
    pub const BROADCAST_DATA: u8 = 0x4E;
    pub const ACK_DATA: u8 = 0x4F;
    pub const BURST_DATA: u8 = 0x50;
    pub const CHANNEL_ID: u8 = 0x51;
    pub const CHANNEL_STATUS: u8 = 0x52;
    pub const CAPABILITIES: u8 = 0x54;
    pub const VERSION: u8 = 0x3E;
    pub const SERIAL_NUMBER: u8 = 0x61;
    pub const STARTUP: u8 = 0x6F;
}

// Channel events carry message id 1 in place of an acknowledged command id
pub const EVENT_MESSAGE_ID: u8 = 0x01;

pub mod event_code {
    pub const RESPONSE_NO_ERROR: u8 = 0x00;
    pub const RX_SEARCH_TIMEOUT: u8 = 0x01;
    pub const RX_FAIL: u8 = 0x02;
    pub const TX: u8 = 0x03;
    pub const TRANSFER_RX_FAILED: u8 = 0x04;
    pub const TRANSFER_TX_COMPLETED: u8 = 0x05;
    pub const TRANSFER_TX_FAILED: u8 = 0x06;
    pub const CHANNEL_CLOSED: u8 = 0x07;
    pub const RX_FAIL_GO_TO_SEARCH: u8 = 0x08;
    pub const CHANNEL_COLLISION: u8 = 0x09;
    pub const TRANSFER_TX_START: u8 = 0x0A;
    pub const CHANNEL_IN_WRONG_STATE: u8 = 0x15;
    pub const CHANNEL_NOT_OPENED: u8 = 0x16;
    pub const CHANNEL_ID_NOT_SET: u8 = 0x18;
    pub const CLOSE_ALL_CHANNELS: u8 = 0x19;
    pub const TRANSFER_IN_PROGRESS: u8 = 0x1F;
    pub const TRANSFER_SEQUENCE_NUMBER_ERROR: u8 = 0x20;
    pub const TRANSFER_IN_ERROR: u8 = 0x21;
    pub const INVALID_MESSAGE: u8 = 0x28;
    pub const INVALID_NETWORK_NUMBER: u8 = 0x29;
    pub const INVALID_LIST_ID: u8 = 0x30;
    pub const INVALID_SCAN_TX_CHANNEL: u8 = 0x31;
    pub const NVM_FULL: u8 = 0x40;
    pub const NVM_WRITE_ERROR: u8 = 0x41;
    pub const RX_BROADCAST: u8 = 0x9A;
    pub const RX_ACKNOWLEDGED: u8 = 0x9B;
    pub const RX_BURST_PACKET: u8 = 0x9C;
}

pub mod data_page {
    pub const CALIBRATION: u8 = 0x01;
    pub const STANDARD_POWER: u8 = 0x10;
    pub const WHEEL_TORQUE: u8 = 0x11;
    pub const CRANK_TORQUE: u8 = 0x12;
    pub const CRANK_TORQUE_FREQUENCY: u8 = 0x20;
    pub const MANUFACTURER_INFO: u8 = 0x50;
    pub const PRODUCT_INFO: u8 = 0x51;
}

pub mod calibration {
    pub const REQUEST_MANUAL_ZERO: u8 = 0xAA;
    pub const AUTO_ZERO_CONFIG: u8 = 0xAB;
    pub const AUTO_ZERO_OFF: u8 = 0x00;
    pub const AUTO_ZERO_ON: u8 = 0x01;
    pub const RESERVED: u8 = 0xFF;
}

// Device type ids and channel parameters for the ANT+ sport profiles
pub mod sport {
    pub const FREQUENCY: u8 = 57;
    pub const HEART_RATE_TYPE: u8 = 0x78;
    pub const HEART_RATE_PERIOD: u16 = 8070;
    pub const POWER_TYPE: u8 = 0x0B;
    pub const POWER_PERIOD: u16 = 8182;
    pub const SPEED_TYPE: u8 = 0x7B;
    pub const SPEED_PERIOD: u16 = 8118;
    pub const CADENCE_TYPE: u8 = 0x7A;
    pub const CADENCE_PERIOD: u16 = 8102;
    pub const SPEED_CADENCE_TYPE: u8 = 0x79;
    pub const SPEED_CADENCE_PERIOD: u16 = 8086;
}

// Quarq's private channels predate the ANT+ power profile
pub mod quarq {
    pub const FREQUENCY: u8 = 61;
    pub const TYPE: u8 = 0x60;
    pub const TYPE_BEFORE_1_8: u8 = 0x0B; // fast channel before firmware 1.8
    pub const PERIOD: u16 = 8182 * 4;
    pub const FAST_PERIOD: u16 = 8182 / 16;
    pub const MANUFACTURER_ID: u16 = 7;
    pub const CINQO_PRODUCT_ID: u16 = 1;
}

/// Human readable description of a channel event or response code.
pub fn describe_event_code(code: u8) -> &'static str {
    use event_code::*;

    match code {
        RESPONSE_NO_ERROR => "No error",
        RX_SEARCH_TIMEOUT => "Search timeout",
        RX_FAIL => "Message RX fail",
        TX => "Event TX",
        TRANSFER_RX_FAILED => "Receive TX fail",
        TRANSFER_TX_COMPLETED => "Ack or Burst completed",
        TRANSFER_TX_FAILED => "Event transfer TX failed",
        CHANNEL_CLOSED => "Channel closed success",
        RX_FAIL_GO_TO_SEARCH => "Dropped to search after missing too many messages",
        CHANNEL_COLLISION => "Channel collision",
        TRANSFER_TX_START => "Burst starts",
        CHANNEL_IN_WRONG_STATE => "Channel in wrong state",
        CHANNEL_NOT_OPENED => "Channel not opened",
        CHANNEL_ID_NOT_SET => "Open without valid id",
        CLOSE_ALL_CHANNELS => "OpenRXScan when other channels open",
        TRANSFER_IN_PROGRESS => "Transmit whilst transfer in progress",
        TRANSFER_SEQUENCE_NUMBER_ERROR => "Sequence number out of order",
        TRANSFER_IN_ERROR => "Burst message past sequence number not transmitted",
        INVALID_MESSAGE => "Invalid parameters",
        INVALID_NETWORK_NUMBER => "Invalid network",
        INVALID_LIST_ID => "ID out of bounds",
        INVALID_SCAN_TX_CHANNEL => "Transmit during scan mode",
        NVM_FULL => "NVM for SensRcore mode is full",
        NVM_WRITE_ERROR => "NVM write failed",
        RX_BROADCAST => "Broadcast received",
        RX_ACKNOWLEDGED => "Acknowledged data received",
        RX_BURST_PACKET => "Burst packet received",
        _ => "Unknown message code",
    }
}
