//! Metric sinks
//!
//! A channel reports everything it learns through a [`TelemetrySink`]: scalar
//! metric updates and lifecycle notifications. Every hook has a default that
//! wraps its arguments in a [`TelemetryEvent`] and hands it to
//! [`TelemetrySink::on_event`], which itself defaults to doing nothing. A sink
//! can therefore override individual hooks, or just `on_event`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::DeviceClass;

/// A derived physical measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Metric {
    /// Instantaneous power in watts.
    Power(f64),
    /// Crank cadence in rev/min.
    Cadence(f64),
    /// Wheel speed in rev/min.
    WheelRpm(f64),
    /// Heart rate in beats/min.
    HeartRate(f64),
}

/// Which quantity a [`Metric`] measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricKind {
    Power,
    Cadence,
    WheelRpm,
    HeartRate,
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Power(_) => MetricKind::Power,
            Metric::Cadence(_) => MetricKind::Cadence,
            Metric::WheelRpm(_) => MetricKind::WheelRpm,
            Metric::HeartRate(_) => MetricKind::HeartRate,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Metric::Power(v) | Metric::Cadence(v) | Metric::WheelRpm(v) | Metric::HeartRate(v) => v,
        }
    }
}

/// Identity of the device a channel is paired with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// `"<device_number><suffix>"`, or `"none"`.
    pub id: String,
    pub class: DeviceClass,
    pub device_number: u16,
    pub device_type: u8,
    pub description: String,
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Nothing received within the blanking window.
    Stale,
    /// The device was lost, or the channel closed.
    Lost,
    /// RX failures were reported by the transceiver.
    Dropped,
    /// A search ended with a device answering.
    SearchComplete,
    /// Identity of the paired device changed.
    ChannelInfo(ChannelInfo),
    /// A burst transfer completed.
    Burst(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Metric(Metric),
    Notification(Notification),
}

/// Everything a channel reports, tagged with the channel number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub channel: u8,
    pub kind: EventKind,
}

impl TelemetryEvent {
    pub fn metric(channel: u8, metric: Metric) -> Self {
        Self { channel, kind: EventKind::Metric(metric) }
    }

    pub fn notification(channel: u8, notification: Notification) -> Self {
        Self { channel, kind: EventKind::Notification(notification) }
    }

    pub fn as_metric(&self) -> Option<Metric> {
        match self.kind {
            EventKind::Metric(metric) => Some(metric),
            EventKind::Notification(_) => None,
        }
    }
}

/// Receiver of channel output.
pub trait TelemetrySink {
    /// Catch-all for every hook that is not overridden.
    fn on_event(&mut self, _event: TelemetryEvent) {}

    fn set_watts(&mut self, channel: u8, watts: f64) {
        self.on_event(TelemetryEvent::metric(channel, Metric::Power(watts)));
    }

    fn set_cadence(&mut self, channel: u8, rpm: f64) {
        self.on_event(TelemetryEvent::metric(channel, Metric::Cadence(rpm)));
    }

    fn set_wheel_rpm(&mut self, channel: u8, rpm: f64) {
        self.on_event(TelemetryEvent::metric(channel, Metric::WheelRpm(rpm)));
    }

    fn set_heart_rate(&mut self, channel: u8, bpm: f64) {
        self.on_event(TelemetryEvent::metric(channel, Metric::HeartRate(bpm)));
    }

    fn stale(&mut self, channel: u8) {
        self.on_event(TelemetryEvent::notification(channel, Notification::Stale));
    }

    fn lost(&mut self, channel: u8) {
        self.on_event(TelemetryEvent::notification(channel, Notification::Lost));
    }

    fn dropped(&mut self, channel: u8) {
        self.on_event(TelemetryEvent::notification(channel, Notification::Dropped));
    }

    fn search_complete(&mut self, channel: u8) {
        self.on_event(TelemetryEvent::notification(channel, Notification::SearchComplete));
    }

    fn channel_info(&mut self, channel: u8, info: ChannelInfo) {
        self.on_event(TelemetryEvent::notification(channel, Notification::ChannelInfo(info)));
    }

    fn burst_received(&mut self, channel: u8, data: Vec<u8>) {
        self.on_event(TelemetryEvent::notification(channel, Notification::Burst(data)));
    }

    /// Dispatch a metric to its specific hook.
    fn publish(&mut self, channel: u8, metric: Metric) {
        match metric {
            Metric::Power(v) => self.set_watts(channel, v),
            Metric::Cadence(v) => self.set_cadence(channel, v),
            Metric::WheelRpm(v) => self.set_wheel_rpm(channel, v),
            Metric::HeartRate(v) => self.set_heart_rate(channel, v),
        }
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for &mut T {
    fn on_event(&mut self, event: TelemetryEvent) {
        (**self).on_event(event)
    }
    fn set_watts(&mut self, channel: u8, watts: f64) {
        (**self).set_watts(channel, watts)
    }
    fn set_cadence(&mut self, channel: u8, rpm: f64) {
        (**self).set_cadence(channel, rpm)
    }
    fn set_wheel_rpm(&mut self, channel: u8, rpm: f64) {
        (**self).set_wheel_rpm(channel, rpm)
    }
    fn set_heart_rate(&mut self, channel: u8, bpm: f64) {
        (**self).set_heart_rate(channel, bpm)
    }
    fn stale(&mut self, channel: u8) {
        (**self).stale(channel)
    }
    fn lost(&mut self, channel: u8) {
        (**self).lost(channel)
    }
    fn dropped(&mut self, channel: u8) {
        (**self).dropped(channel)
    }
    fn search_complete(&mut self, channel: u8) {
        (**self).search_complete(channel)
    }
    fn channel_info(&mut self, channel: u8, info: ChannelInfo) {
        (**self).channel_info(channel, info)
    }
    fn burst_received(&mut self, channel: u8, data: Vec<u8>) {
        (**self).burst_received(channel, data)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {}

/// Keeps every event, in order. Handy for tests and replay tooling.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub events: Vec<TelemetryEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.events.iter().filter_map(TelemetryEvent::as_metric).collect()
    }

    pub fn notifications(&self) -> Vec<&Notification> {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Notification(n) => Some(n),
                EventKind::Metric(_) => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl TelemetrySink for RecordingSink {
    fn on_event(&mut self, event: TelemetryEvent) {
        self.events.push(event);
    }
}

/// Publishes events on a tokio broadcast channel.
///
/// Sending never blocks; with no subscribers events are discarded, and slow
/// subscribers observe `Lagged` on their side.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<TelemetryEvent> {
        self.tx.clone()
    }
}

impl TelemetrySink for BroadcastSink {
    fn on_event(&mut self, event: TelemetryEvent) {
        if self.tx.send(event).is_err() {
            trace!("No telemetry subscribers, event discarded");
        }
    }
}
