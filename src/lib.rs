//! ANT+ sport channel protocol engine.
//!
//! Crankset runs the receive side of ANT+ channels for cycling and fitness
//! sensors: power meters, heart rate straps, speed and cadence sensors.
//! Feed it the raw frames a transceiver delivers and it negotiates the
//! channel configuration, identifies the device, and turns successive data
//! pages into watts, rpm and bpm.
//!
//! # Features
//!
//! - **Lifecycle**: assign, configure, search and reopen channels from
//!   transceiver acknowledgements
//! - **Decoding**: typed messages and data pages, validated once at the boundary
//! - **Metrics**: standard power, crank/wheel torque, crank torque frequency,
//!   heart rate, speed and cadence with dropout detection
//! - **Bursts**: sequenced reassembly of multi-packet transfers
//! - **Async**: an optional tokio driver per channel with broadcast events
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Instant;
//! use crankset::{Channel, ChannelConfig, DeviceClass, RecordingSink, SensorRegistry};
//!
//! let registry = Arc::new(SensorRegistry::ant_sport());
//! let mut channel = Channel::new(0, registry, ChannelConfig::default(), RecordingSink::new());
//! channel.open(0, DeviceClass::HeartRate);
//!
//! for command in channel.take_commands() {
//!     let bytes = command.encode();
//!     // write `bytes` to the transceiver, then feed its answers back:
//!     # let _ = bytes;
//! }
//! # let raw = [0xA4, 0x03, 0x40, 0x00, 0x42, 0x00, 0xA5];
//! channel.receive(&raw, Instant::now())?;
//! # Ok::<(), crankset::AntError>(())
//! ```

// Core types and error handling
mod error;
pub mod protocol;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire format
pub mod codec;

// Channel processing
pub mod burst;
pub mod channel;
pub mod config;
pub mod interpreter;
pub mod registry;
pub mod sink;
pub mod state;

// Async integration
pub mod driver;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use codec::{
    AntMessage, Broadcast, BurstFragment, ChannelEvent, ChannelIdent, Command, Frame, Telemetry,
};

// Main API exports
pub use burst::BurstReassembler;
pub use channel::{Channel, ChannelStats, ChannelStatus, DeviceIdentity, DeviceQuirk};
pub use config::{ChannelConfig, Settings};
pub use interpreter::TelemetryInterpreter;
pub use registry::{SensorRegistry, SensorType};
pub use sink::{
    BroadcastSink, ChannelInfo, EventKind, Metric, MetricKind, Notification, NullSink,
    RecordingSink, TelemetryEvent, TelemetrySink,
};
pub use state::{ChannelState, ChannelStateMachine};

pub use driver::{ChannelDriver, CommandSink, Control, DriverHandle, FrameSource};
pub use stream::CoalesceExt;
