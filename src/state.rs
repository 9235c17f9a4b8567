//! Channel lifecycle state machine
//!
//! Opening a receive channel is a chain of configuration commands, each sent
//! only once the transceiver acknowledged the previous one:
//!
//! ```text
//! unassign -> assign -> set channel id -> search timeout -> period -> frequency -> open
//! ```
//!
//! The acknowledgement of each step names the command it answers, and that
//! name alone decides the next command. Unsolicited channel events (search
//! timeouts, RX failures, channel closed) move the channel between search
//! phases or back to the start of the chain.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::codec::{ChannelEvent, ChannelIdent, Command};
use crate::config::ChannelConfig;
use crate::protocol::{CHANNEL_TYPE_RECEIVE, PAIRING_BIT, event_code, message_id};
use crate::registry::SensorRegistry;
use crate::sink::{ChannelInfo, TelemetrySink};
use crate::types::{DeviceClass, SearchFlags};
use crate::{AntError, Result};

/// Where a channel is in its configuration chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    Unassigned,
    Assigned,
    /// Channel id configured, waiting for the search timeout ack.
    IdentityRequested,
    SearchTimeoutSet,
    PeriodSet,
    FrequencySet,
    /// Open and searching.
    Open,
    /// Close acknowledged, waiting for the channel closed event.
    ClosePending,
    /// A device answered and identified itself.
    MessageReceived,
}

impl ChannelState {
    /// State reached when the command with `message_id` is acknowledged.
    pub fn from_ack(message_id: u8) -> Option<Self> {
        match message_id {
            message_id::UNASSIGN_CHANNEL => Some(ChannelState::Unassigned),
            message_id::ASSIGN_CHANNEL => Some(ChannelState::Assigned),
            message_id::CHANNEL_ID => Some(ChannelState::IdentityRequested),
            message_id::SEARCH_TIMEOUT => Some(ChannelState::SearchTimeoutSet),
            message_id::CHANNEL_PERIOD => Some(ChannelState::PeriodSet),
            message_id::CHANNEL_FREQUENCY => Some(ChannelState::FrequencySet),
            message_id::OPEN_CHANNEL => Some(ChannelState::Open),
            message_id::CLOSE_CHANNEL => Some(ChannelState::ClosePending),
            _ => None,
        }
    }

    /// Whether the remote device has identified itself.
    pub fn has_identity(self) -> bool {
        matches!(self, ChannelState::MessageReceived | ChannelState::ClosePending)
    }
}

/// Lifecycle of one channel: class, search phase, identity and the commands
/// the next steps need.
///
/// Commands are queued, never sent; the owner drains them with
/// [`take_commands`](Self::take_commands).
#[derive(Debug)]
pub struct ChannelStateMachine {
    number: u8,
    class: DeviceClass,
    flags: SearchFlags,
    device_number: u16,
    device_type: u8,
    state: ChannelState,
    assigned: bool,
    closing: bool,
    id: String,
    // reference point for collapsing RX failures into one drop notification
    last_message_at: Option<Instant>,
    messages_dropped: u64,
    registry: Arc<SensorRegistry>,
    config: ChannelConfig,
    outbox: VecDeque<Command>,
}

impl ChannelStateMachine {
    pub fn new(number: u8, registry: Arc<SensorRegistry>, config: ChannelConfig) -> Self {
        Self {
            number,
            class: DeviceClass::Unused,
            flags: SearchFlags::default(),
            device_number: 0,
            device_type: 0,
            state: ChannelState::Unassigned,
            assigned: false,
            closing: false,
            id: "none".to_string(),
            last_message_at: None,
            messages_dropped: 0,
            registry,
            config,
            outbox: VecDeque::new(),
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn flags(&self) -> SearchFlags {
        self.flags
    }

    pub fn device_number(&self) -> u16 {
        self.device_number
    }

    pub fn device_type(&self) -> u8 {
        self.device_type
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped
    }

    /// `"<device number><suffix>"`, or `"none"` for an unused channel.
    pub fn channel_id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// Still looking for a device, or not yet identified.
    pub fn is_searching(&self) -> bool {
        self.flags.is_searching() || self.state != ChannelState::MessageReceived
    }

    pub fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id.clone(),
            class: self.class,
            device_number: self.device_number,
            device_type: self.device_type,
            description: self.registry.get(self.class).name.clone(),
        }
    }

    /// Request the pairing bit on the next channel id.
    pub fn set_pairing(&mut self, paired: bool) {
        self.flags.paired = paired;
    }

    /// Note a message from the device; RX failures are measured from here.
    pub fn record_message(&mut self, now: Instant) {
        self.last_message_at = Some(now);
    }

    pub fn queue(&mut self, command: Command) {
        trace!(channel = self.number, ?command, "Queueing command");
        self.outbox.push_back(command);
    }

    /// Drain queued commands in the order they were produced.
    pub fn take_commands(&mut self) -> Vec<Command> {
        self.outbox.drain(..).collect()
    }

    pub fn pending_commands(&self) -> usize {
        self.outbox.len()
    }

    /// Start searching for `class`, on a specific device or on any
    /// (`device_number` 0).
    ///
    /// A channel that is still assigned is unassigned first; its ack restarts
    /// the configuration chain.
    pub fn open(&mut self, device_number: u16, class: DeviceClass) {
        info!(channel = self.number, ?class, device_number, "Opening channel");
        self.class = class;
        self.flags = SearchFlags::opening(self.flags.paired);
        self.device_number = device_number;
        self.closing = false;
        self.refresh_id();

        if self.assigned {
            self.queue(Command::UnassignChannel { channel: self.number });
        } else {
            self.attempt_transition(message_id::UNASSIGN_CHANNEL);
        }
    }

    /// Close the channel. The device is reported lost straight away; the
    /// channel is unassigned once the transceiver confirms the close.
    pub fn close<S: TelemetrySink + ?Sized>(&mut self, sink: &mut S) {
        info!(channel = self.number, id = %self.id, "Closing channel");
        sink.lost(self.number);
        self.closing = true;
        self.queue(Command::CloseChannel { channel: self.number });
    }

    /// Apply a channel event or command response.
    ///
    /// Returns the new state when an acknowledgement moved the channel along
    /// its chain.
    pub fn on_channel_event<S: TelemetrySink + ?Sized>(
        &mut self,
        event: &ChannelEvent,
        now: Instant,
        sink: &mut S,
    ) -> Result<Option<ChannelState>> {
        if event.is_response_no_error() {
            return Ok(self.attempt_transition(event.message_id));
        }

        if !event.is_event() {
            warn!(
                channel = self.number,
                message_id = event.message_id,
                code = event.code,
                "Command rejected: {}",
                event.description()
            );
            return Ok(None);
        }

        match event.code {
            event_code::CHANNEL_CLOSED => {
                debug!(channel = self.number, "Channel closed");
                self.queue(Command::UnassignChannel { channel: self.number });
            }
            event_code::RX_SEARCH_TIMEOUT => self.on_search_timeout(sink),
            event_code::RX_FAIL => self.on_rx_fail(now, sink),
            event_code::RX_ACKNOWLEDGED => {
                return Err(AntError::UnexpectedAcknowledged { channel: self.number });
            }
            event_code::TRANSFER_TX_COMPLETED => {
                trace!(channel = self.number, "Transfer completed");
            }
            code => {
                warn!(channel = self.number, code, "Channel event: {}", event.description());
            }
        }

        Ok(None)
    }

    /// A device answered the search and identified itself.
    pub fn on_channel_id<S: TelemetrySink + ?Sized>(&mut self, ident: &ChannelIdent, sink: &mut S) {
        self.device_number = ident.device_number;
        self.device_type = ident.device_type;
        self.state = ChannelState::MessageReceived;
        self.refresh_id();

        info!(
            channel = self.number,
            id = %self.id,
            device_type = ident.device_type,
            transmission_type = ident.transmission_type,
            "Device identified"
        );

        sink.channel_info(self.number, self.channel_info());
        sink.search_complete(self.number);

        if self.flags.quick_search {
            self.queue(Command::SetSearchTimeout {
                channel: self.number,
                timeout: self.config.lost_timeout_units(),
            });
        }
        self.flags.found();
    }

    /// Advance the configuration chain on the ack of `message_id`.
    ///
    /// Acks for commands outside the chain (calibration, message requests)
    /// leave the state alone.
    pub fn attempt_transition(&mut self, message_id: u8) -> Option<ChannelState> {
        let Some(next) = ChannelState::from_ack(message_id) else {
            trace!(channel = self.number, message_id, "Ack outside the configuration chain");
            return None;
        };

        let previous = self.state;
        self.state = next;
        let sensor = self.registry.get(self.class);
        let (device_type, network, period, frequency) =
            (sensor.device_type, sensor.network, sensor.period, sensor.frequency);

        match next {
            ChannelState::Unassigned => {
                self.assigned = false;
                if self.closing || self.class == DeviceClass::Unused {
                    self.closing = false;
                    self.clear_identity();
                } else {
                    self.device_type = device_type;
                    if self.flags.paired {
                        self.device_type |= PAIRING_BIT;
                    }
                    self.refresh_id();
                    self.queue(Command::AssignChannel {
                        channel: self.number,
                        channel_type: CHANNEL_TYPE_RECEIVE,
                        network,
                    });
                }
            }
            ChannelState::Assigned => {
                self.assigned = true;
                self.queue(Command::SetChannelId {
                    channel: self.number,
                    device_number: self.device_number,
                    device_type: self.device_type,
                    transmission_type: 0,
                });
            }
            ChannelState::IdentityRequested => {
                let timeout = if self.flags.quick_search {
                    self.config.scan_timeout_units()
                } else {
                    self.config.lost_timeout_units()
                };
                self.queue(Command::SetSearchTimeout { channel: self.number, timeout });
            }
            ChannelState::SearchTimeoutSet => {
                if previous == ChannelState::IdentityRequested {
                    self.queue(Command::SetChannelPeriod { channel: self.number, period });
                } else {
                    // search timeout changed on a running channel
                    self.state = previous;
                    return None;
                }
            }
            ChannelState::PeriodSet => {
                self.queue(Command::SetChannelFrequency { channel: self.number, frequency });
            }
            ChannelState::FrequencySet => {
                self.queue(Command::OpenChannel { channel: self.number });
            }
            ChannelState::Open | ChannelState::ClosePending | ChannelState::MessageReceived => {}
        }

        debug!(channel = self.number, from = ?previous, to = ?self.state, "Channel transition");
        Some(self.state)
    }

    fn on_search_timeout<S: TelemetrySink + ?Sized>(&mut self, sink: &mut S) {
        if self.flags.quick_search {
            debug!(channel = self.number, "Quick search timed out, waiting");
            self.flags.start_waiting();
            return;
        }

        info!(channel = self.number, id = %self.id, "Search exhausted, releasing channel");
        sink.lost(self.number);
        self.class = DeviceClass::Unused;
        self.flags = SearchFlags { paired: self.flags.paired, ..SearchFlags::default() };
        self.device_number = 0;
        self.refresh_id();
        self.queue(Command::UnassignChannel { channel: self.number });
    }

    fn on_rx_fail<S: TelemetrySink + ?Sized>(&mut self, now: Instant, sink: &mut S) {
        self.messages_dropped += 1;
        let window = self.config.drop_timeout();

        let overdue = match self.last_message_at {
            Some(reference) => now > reference + window,
            None => true,
        };

        if overdue {
            if self.class != DeviceClass::Unused {
                debug!(channel = self.number, dropped = self.messages_dropped, "Messages dropped");
                sink.dropped(self.number);
            }
            // push the reference past the window so one outage reports once
            let base = self.last_message_at.unwrap_or(now);
            self.last_message_at = Some(base + window * 2);
        }
    }

    fn clear_identity(&mut self) {
        self.class = DeviceClass::Unused;
        self.flags = SearchFlags { paired: self.flags.paired, ..SearchFlags::default() };
        self.device_number = 0;
        self.device_type = 0;
        self.last_message_at = None;
        self.refresh_id();
        debug!(channel = self.number, "Channel released");
    }

    fn refresh_id(&mut self) {
        self.id = self.registry.channel_id(self.class, self.device_number);
    }
}
