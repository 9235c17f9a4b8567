//! Channel supervisor
//!
//! [`Channel`] is the unit a host talks to. It takes raw frames received on
//! its channel number, decodes them once, and routes each category to the
//! part that owns it:
//!
//! - channel events and channel id notifications go to the
//!   [`ChannelStateMachine`];
//! - broadcasts carry either identity pages (manufacturer, product) or
//!   telemetry for the [`TelemetryInterpreter`];
//! - burst fragments go to the [`BurstReassembler`].
//!
//! Outbound commands accumulate in a queue the caller drains with
//! [`Channel::take_commands`]. Timing is cooperative: callers pass the
//! receive time with every frame and call [`Channel::tick`] periodically so
//! silence can be reported as staleness.
//!
//! ```rust
//! use std::sync::Arc;
//! use crankset::{Channel, ChannelConfig, Command, DeviceClass, NullSink, SensorRegistry};
//!
//! let registry = Arc::new(SensorRegistry::ant_sport());
//! let mut channel = Channel::new(0, registry, ChannelConfig::default(), NullSink);
//! channel.open(0, DeviceClass::Power);
//!
//! let first = channel.take_commands();
//! assert_eq!(first, vec![Command::AssignChannel { channel: 0, channel_type: 0, network: 1 }]);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::Result;
use crate::burst::BurstReassembler;
use crate::codec::{AntMessage, Broadcast, Command, ManufacturerInfo, ProductInfo, Telemetry};
use crate::config::ChannelConfig;
use crate::interpreter::TelemetryInterpreter;
use crate::protocol::{message_id, quarq};
use crate::registry::SensorRegistry;
use crate::sink::TelemetrySink;
use crate::state::{ChannelState, ChannelStateMachine};
use crate::types::{DeviceClass, SearchFlags};

/// Known device peculiarities, detected from the identity pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceQuirk {
    /// Quarq Cinqo power meter.
    Cinqo {
        /// Firmware that predates the ANT+ power profile.
        legacy_firmware: bool,
    },
}

/// What the device said about itself in the common data pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer_id: u16,
    pub product_id: u16,
    /// Software revision in the high byte, hardware revision in the low byte.
    pub product_version: u16,
    pub quirk: Option<DeviceQuirk>,
    #[serde(skip)]
    manufacturer_seen: bool,
    #[serde(skip)]
    product_seen: bool,
}

impl DeviceIdentity {
    /// Wait for fresh copies of both pages before judging quirks again.
    fn rearm(&mut self) {
        self.manufacturer_seen = false;
        self.product_seen = false;
    }

    fn record_manufacturer(&mut self, info: &ManufacturerInfo) {
        self.manufacturer_seen = true;
        self.product_version = (self.product_version & 0xFF00) | info.hardware_revision as u16;
        self.manufacturer_id = info.manufacturer_id;
        self.product_id = info.model_number;
    }

    fn record_product(&mut self, info: &ProductInfo) {
        self.product_seen = true;
        let software = (info.software_revision as u16) << 8;
        self.product_version = (self.product_version & 0x00FF) | software;
    }

    /// Evaluate quirks once both pages arrived; returns a newly detected one.
    fn detect_quirk(&mut self) -> Option<DeviceQuirk> {
        if !(self.manufacturer_seen && self.product_seen) {
            return None;
        }
        let cinqo = self.manufacturer_id == quarq::MANUFACTURER_ID
            && self.product_id == quarq::CINQO_PRODUCT_ID;
        if !cinqo {
            return None;
        }

        let [hi, lo] = self.product_version.to_be_bytes();
        let quirk = DeviceQuirk::Cinqo { legacy_firmware: hi <= 17 && lo == 10 };
        if self.quirk == Some(quirk) {
            return None;
        }
        self.quirk = Some(quirk);
        Some(quirk)
    }
}

/// Per-channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub malformed_frames: u64,
    pub bursts_completed: u64,
    pub burst_gaps: u64,
}

/// Serialisable snapshot of a channel for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub number: u8,
    pub id: String,
    pub class: DeviceClass,
    pub description: String,
    pub state: ChannelState,
    pub flags: SearchFlags,
    pub searching: bool,
    pub blanked: bool,
    pub device_number: u16,
    pub device_type: u8,
    pub identity: DeviceIdentity,
    pub stats: ChannelStats,
}

/// One ANT receive channel and everything derived from it.
#[derive(Debug)]
pub struct Channel<S> {
    machine: ChannelStateMachine,
    interpreter: TelemetryInterpreter,
    burst: BurstReassembler,
    identity: DeviceIdentity,
    snapshot: Option<Telemetry>,
    stats: ChannelStats,
    blanked: bool,
    last_seen: Option<Instant>,
    blanking_timeout: Duration,
    sink: S,
}

impl<S: TelemetrySink> Channel<S> {
    pub fn new(number: u8, registry: Arc<SensorRegistry>, config: ChannelConfig, sink: S) -> Self {
        Self {
            interpreter: TelemetryInterpreter::new(&config),
            burst: BurstReassembler::new(config.burst_capacity),
            identity: DeviceIdentity::default(),
            snapshot: None,
            stats: ChannelStats::default(),
            blanked: true,
            last_seen: None,
            blanking_timeout: config.blanking_timeout(),
            machine: ChannelStateMachine::new(number, registry, config),
            sink,
        }
    }

    pub fn number(&self) -> u8 {
        self.machine.number()
    }

    pub fn class(&self) -> DeviceClass {
        self.machine.class()
    }

    pub fn state(&self) -> ChannelState {
        self.machine.state()
    }

    pub fn channel_id(&self) -> &str {
        self.machine.channel_id()
    }

    pub fn is_searching(&self) -> bool {
        self.machine.is_searching()
    }

    pub fn is_blanked(&self) -> bool {
        self.blanked
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn quirk(&self) -> Option<DeviceQuirk> {
        self.identity.quirk
    }

    /// Most recent recognised telemetry.
    pub fn snapshot(&self) -> Option<&Telemetry> {
        self.snapshot.as_ref()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            messages_dropped: self.machine.messages_dropped(),
            burst_gaps: self.burst.gaps(),
            ..self.stats
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            number: self.number(),
            id: self.machine.channel_id().to_string(),
            class: self.machine.class(),
            description: self.machine.registry().get(self.machine.class()).name.clone(),
            state: self.machine.state(),
            flags: self.machine.flags(),
            searching: self.machine.is_searching(),
            blanked: self.blanked,
            device_number: self.machine.device_number(),
            device_type: self.machine.device_type(),
            identity: self.identity,
            stats: self.stats(),
        }
    }

    /// Start searching for a device of `class`; `device_number` 0 accepts any.
    pub fn open(&mut self, device_number: u16, class: DeviceClass) {
        self.forget_device();
        self.machine.open(device_number, class);
    }

    /// Close the channel; the sink hears `lost` immediately.
    pub fn close(&mut self) {
        self.machine.close(&mut self.sink);
        self.snapshot = None;
        self.interpreter.reset();
    }

    pub fn set_pairing(&mut self, paired: bool) {
        self.machine.set_pairing(paired);
    }

    /// Ask the power meter for a manual zero offset calibration.
    pub fn request_calibrate(&mut self) {
        let channel = self.number();
        self.machine.queue(Command::RequestCalibrate { channel });
    }

    pub fn set_auto_calibrate(&mut self, auto_zero: bool) {
        let channel = self.number();
        self.machine.queue(Command::SetAutoCalibrate { channel, auto_zero });
    }

    /// Drain the commands waiting to be sent, oldest first.
    pub fn take_commands(&mut self) -> Vec<Command> {
        self.machine.take_commands()
    }

    /// Process one raw frame received at `now`.
    ///
    /// Malformed frames are counted and dropped. The only error surfaced is
    /// an acknowledged-data event, which a receive channel never expects.
    pub fn receive(&mut self, raw: &[u8], now: Instant) -> Result<()> {
        let message = match AntMessage::decode(raw, self.machine.class()) {
            Ok(message) => message,
            Err(e) if e.is_malformed_frame() => {
                self.stats.malformed_frames += 1;
                debug!(channel = self.number(), error = %e, "Ignoring malformed frame");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.handle(message, now)
    }

    /// Process an already decoded message.
    pub fn handle(&mut self, message: AntMessage, now: Instant) -> Result<()> {
        if let Some(channel) = message.channel().filter(|&c| c != self.number()) {
            trace!(channel = self.number(), other = channel, "Message for another channel");
            return Ok(());
        }

        trace!(channel = self.number(), ?message, "Received");
        self.blanked = false;
        self.last_seen = Some(now);

        match message {
            AntMessage::ChannelEvent(event) => {
                let transition = self.machine.on_channel_event(&event, now, &mut self.sink)?;
                match transition {
                    Some(ChannelState::FrequencySet) => self.identity.rearm(),
                    Some(ChannelState::Unassigned) if self.class() == DeviceClass::Unused => {
                        self.forget_device();
                    }
                    _ => {}
                }
            }
            AntMessage::ChannelId(ident) => {
                if ident.device_number != self.machine.device_number() {
                    // counters of another device must not be differenced
                    self.forget_device();
                }
                self.machine.on_channel_id(&ident, &mut self.sink);
            }
            AntMessage::Broadcast { data, .. } => self.on_broadcast(data, now),
            AntMessage::Burst(fragment) => {
                if let Some(data) = self.burst.feed(&fragment) {
                    self.stats.bursts_completed += 1;
                    debug!(channel = self.number(), bytes = data.len(), "Burst complete");
                    self.sink.burst_received(self.number(), data);
                }
            }
            AntMessage::Acknowledged { .. } => {
                trace!(channel = self.number(), "Acknowledged data ignored");
            }
            AntMessage::ChannelStatus { status, .. } => {
                debug!(channel = self.number(), status, "Channel status");
            }
            AntMessage::Unknown { message_id } => {
                trace!(channel = self.number(), message_id, "Unknown message ignored");
            }
            other => {
                trace!(channel = self.number(), message = ?other, "Device level message ignored");
            }
        }

        Ok(())
    }

    /// Report staleness once when nothing arrived within the blanking window.
    pub fn tick(&mut self, now: Instant) {
        if self.blanked {
            return;
        }
        let Some(last_seen) = self.last_seen else {
            return;
        };
        if now.saturating_duration_since(last_seen) > self.blanking_timeout {
            self.blanked = true;
            info!(channel = self.number(), id = %self.machine.channel_id(), "Channel stale");
            self.sink.stale(self.number());
        }
    }

    fn on_broadcast(&mut self, data: Broadcast, now: Instant) {
        self.stats.messages_received += 1;
        self.machine.record_message(now);

        if !self.machine.state().has_identity() {
            // telemetry means nothing until we know who sends it
            let channel = self.number();
            let message_id = message_id::CHANNEL_ID;
            self.machine.queue(Command::RequestMessage { channel, message_id });
            return;
        }
        if !self.machine.class().is_interpreted() {
            trace!(channel = self.number(), "Broadcast on a channel without telemetry");
            return;
        }

        match data {
            Broadcast::Manufacturer(info) => {
                self.identity.record_manufacturer(&info);
                self.check_quirk();
            }
            Broadcast::Product(info) => {
                self.identity.record_product(&info);
                self.check_quirk();
            }
            Broadcast::Telemetry(Telemetry::Unrecognised { page }) => {
                trace!(channel = self.number(), page, "Unrecognised data page");
            }
            Broadcast::Telemetry(telemetry) => {
                let channel = self.number();
                for metric in self.interpreter.interpret(self.snapshot.as_ref(), &telemetry) {
                    self.sink.publish(channel, metric);
                }
                self.snapshot = Some(telemetry);
            }
        }
    }

    fn check_quirk(&mut self) {
        let Some(quirk) = self.identity.detect_quirk() else {
            return;
        };
        let version = self.identity.product_version;
        match quirk {
            DeviceQuirk::Cinqo { legacy_firmware: true } => {
                warn!(channel = self.number(), version, "Legacy Cinqo firmware");
            }
            DeviceQuirk::Cinqo { .. } => {
                info!(channel = self.number(), version, "Cinqo detected");
            }
        }
    }

    fn forget_device(&mut self) {
        self.identity = DeviceIdentity::default();
        self.snapshot = None;
        self.interpreter.reset();
        self.burst.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::event_code;
    use crate::sink::{Metric, Notification, RecordingSink};
    use crate::test_utils::*;

    fn channel() -> Channel<RecordingSink> {
        let registry = Arc::new(SensorRegistry::ant_sport());
        Channel::new(0, registry, ChannelConfig::default(), RecordingSink::new())
    }

    fn identified(class: DeviceClass, device_type: u8, now: Instant) -> Channel<RecordingSink> {
        let mut channel = channel();
        open_channel(&mut channel, 0, class, now);
        channel.receive(&channel_id_frame(0, 4242, device_type), now).unwrap();
        channel.take_commands();
        channel.sink_mut().clear();
        channel
    }

    #[test]
    fn broadcast_before_identity_requests_channel_id() {
        let mut channel = channel();
        let now = Instant::now();
        open_channel(&mut channel, 0, DeviceClass::Power, now);

        channel.receive(&broadcast_frame(0, standard_power_page(1, 200)), now).unwrap();
        assert_eq!(
            channel.take_commands(),
            vec![Command::RequestMessage { channel: 0, message_id: message_id::CHANNEL_ID }]
        );
        assert!(channel.snapshot().is_none());
        assert!(channel.sink().metrics().is_empty());
    }

    #[test]
    fn standard_power_flows_to_the_sink() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);

        for (events, watts) in [(1, 200), (2, 210), (3, 220)] {
            channel.receive(&broadcast_frame(0, standard_power_page(events, watts)), now).unwrap();
        }
        assert_eq!(channel.sink().metrics(), vec![Metric::Power(210.0), Metric::Power(220.0)]);
        assert_eq!(channel.stats().messages_received, 3);
    }

    #[test]
    fn unrecognised_pages_keep_the_snapshot() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&broadcast_frame(0, standard_power_page(1, 200)), now).unwrap();
        channel.receive(&broadcast_frame(0, [0x13, 0, 0, 0, 0, 0, 0, 0]), now).unwrap();
        channel.receive(&broadcast_frame(0, standard_power_page(2, 300)), now).unwrap();
        assert_eq!(channel.sink().metrics(), vec![Metric::Power(300.0)]);
    }

    #[test]
    fn identity_pages_detect_a_legacy_cinqo() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Quarq, 0x60, now);

        channel.receive(&broadcast_frame(0, manufacturer_page(10, 7, 1)), now).unwrap();
        assert_eq!(channel.quirk(), None);
        channel.receive(&broadcast_frame(0, product_page(17, 1234)), now).unwrap();

        assert_eq!(channel.quirk(), Some(DeviceQuirk::Cinqo { legacy_firmware: true }));
        assert_eq!(channel.identity().product_version, 0x110A);
        assert!(channel.snapshot().is_none());
    }

    #[test]
    fn current_cinqo_firmware_is_not_legacy() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&broadcast_frame(0, product_page(21, 1)), now).unwrap();
        channel.receive(&broadcast_frame(0, manufacturer_page(10, 7, 1)), now).unwrap();
        assert_eq!(channel.quirk(), Some(DeviceQuirk::Cinqo { legacy_firmware: false }));
    }

    #[test]
    fn other_manufacturers_have_no_quirk() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&broadcast_frame(0, manufacturer_page(10, 1, 1)), now).unwrap();
        channel.receive(&broadcast_frame(0, product_page(10, 1)), now).unwrap();
        assert_eq!(channel.quirk(), None);
        assert_eq!(channel.identity().manufacturer_id, 1);
    }

    #[test]
    fn staleness_is_reported_once_and_cleared_by_traffic() {
        let start = Instant::now();
        let mut channel = identified(DeviceClass::HeartRate, 0x78, start);
        assert!(!channel.is_blanked());

        channel.tick(start + Duration::from_secs(1));
        assert!(channel.sink().events.is_empty());

        channel.tick(start + Duration::from_secs(3));
        channel.tick(start + Duration::from_secs(4));
        assert_eq!(channel.sink().notifications(), vec![&Notification::Stale]);
        assert!(channel.is_blanked());

        let page = broadcast_frame(0, heart_rate_page(100, 1, 60));
        channel.receive(&page, start + Duration::from_secs(5)).unwrap();
        assert!(!channel.is_blanked());
    }

    #[test]
    fn a_fresh_channel_is_blanked_without_reporting() {
        let mut channel = channel();
        assert!(channel.is_blanked());
        channel.tick(Instant::now() + Duration::from_secs(60));
        assert!(channel.sink().events.is_empty());
    }

    #[test]
    fn malformed_frames_are_counted_and_ignored() {
        let mut channel = channel();
        let mut raw = broadcast_frame(0, standard_power_page(1, 1));
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        channel.receive(&raw, Instant::now()).unwrap();
        channel.receive(&[0x00, 0x01], Instant::now()).unwrap();
        assert_eq!(channel.stats().malformed_frames, 2);
        assert!(channel.is_blanked());
    }

    #[test]
    fn acknowledged_event_surfaces_as_error() {
        let mut channel = channel();
        let raw = event_frame(0, event_code::RX_ACKNOWLEDGED);
        let err = channel.receive(&raw, Instant::now()).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn burst_transfers_reach_the_sink() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&burst_frame(0, 0, false, &[1, 2, 3, 4, 5, 6, 7, 8]), now).unwrap();
        channel.receive(&burst_frame(0, 2, false, &[0xEE; 8]), now).unwrap();
        channel.receive(&burst_frame(0, 1, true, &[9, 10]), now).unwrap();

        assert_eq!(
            channel.sink().notifications(),
            vec![&Notification::Burst(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10])]
        );
        let stats = channel.stats();
        assert_eq!(stats.bursts_completed, 1);
        assert_eq!(stats.burst_gaps, 1);
    }

    #[test]
    fn close_forgets_the_device() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&broadcast_frame(0, manufacturer_page(1, 7, 1)), now).unwrap();
        channel.receive(&broadcast_frame(0, standard_power_page(1, 200)), now).unwrap();

        channel.close();
        assert_eq!(channel.take_commands(), vec![Command::CloseChannel { channel: 0 }]);
        channel.receive(&ack_frame(0, message_id::CLOSE_CHANNEL), now).unwrap();
        channel.receive(&event_frame(0, event_code::CHANNEL_CLOSED), now).unwrap();
        acknowledge_pending(&mut channel, now);

        assert_eq!(channel.class(), DeviceClass::Unused);
        assert_eq!(channel.channel_id(), "none");
        assert_eq!(channel.identity().manufacturer_id, 0);
        assert!(channel.snapshot().is_none());
        assert!(channel.sink().notifications().contains(&&Notification::Lost));
    }

    #[test]
    fn a_new_device_starts_from_a_clean_slate() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&broadcast_frame(0, standard_power_page(1, 200)), now).unwrap();
        channel.receive(&broadcast_frame(0, manufacturer_page(10, 7, 1)), now).unwrap();

        channel.receive(&channel_id_frame(0, 5151, 0x0B), now).unwrap();
        assert_eq!(channel.channel_id(), "5151p");
        assert!(channel.snapshot().is_none());
        assert_eq!(channel.identity().manufacturer_id, 0);

        // first page of the new meter is only a baseline
        channel.receive(&broadcast_frame(0, standard_power_page(2, 300)), now).unwrap();
        assert!(channel.sink().metrics().is_empty());
        channel.receive(&broadcast_frame(0, standard_power_page(3, 310)), now).unwrap();
        assert_eq!(channel.sink().metrics(), vec![Metric::Power(310.0)]);
    }

    #[test]
    fn repeated_channel_id_keeps_the_snapshot() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&broadcast_frame(0, standard_power_page(1, 200)), now).unwrap();
        channel.receive(&channel_id_frame(0, 4242, 0x0B), now).unwrap();
        channel.receive(&broadcast_frame(0, standard_power_page(2, 220)), now).unwrap();
        assert_eq!(channel.sink().metrics(), vec![Metric::Power(220.0)]);
    }

    #[test]
    fn control_channels_produce_no_telemetry() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Control, 0x10, now);
        channel.receive(&broadcast_frame(0, standard_power_page(1, 200)), now).unwrap();
        channel.receive(&broadcast_frame(0, standard_power_page(2, 220)), now).unwrap();
        assert!(channel.sink().metrics().is_empty());
        assert!(channel.snapshot().is_none());
        assert_eq!(channel.stats().messages_received, 2);
    }

    #[test]
    fn frames_for_other_channels_are_ignored() {
        let now = Instant::now();
        let mut channel = identified(DeviceClass::Power, 0x0B, now);
        channel.receive(&broadcast_frame(3, standard_power_page(1, 200)), now).unwrap();
        assert_eq!(channel.stats().messages_received, 0);
    }

    #[test]
    fn calibration_commands_are_queued() {
        let mut channel = channel();
        channel.request_calibrate();
        channel.set_auto_calibrate(false);
        assert_eq!(
            channel.take_commands(),
            vec![
                Command::RequestCalibrate { channel: 0 },
                Command::SetAutoCalibrate { channel: 0, auto_zero: false },
            ]
        );
    }

    #[test]
    fn status_serialises() {
        let now = Instant::now();
        let channel = identified(DeviceClass::Speed, 0x7B, now);
        let status = channel.status();
        assert_eq!(status.id, "4242s");
        assert_eq!(status.state, ChannelState::MessageReceived);
        assert!(!status.searching);
        let yaml = serde_yaml_ng::to_string(&status).unwrap();
        assert!(yaml.contains("4242s"));
    }
}
