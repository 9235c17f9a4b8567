//! Driver runs a channel on its own task
//!
//! The core [`Channel`] is synchronous and knows nothing about IO. The driver
//! owns one channel together with a [`FrameSource`] and a [`CommandSink`],
//! and serialises everything that touches the channel through a single
//! `tokio::select!` loop: inbound frames, control requests from the
//! [`DriverHandle`], a staleness ticker and cancellation. After every step
//! queued commands are encoded and written out, and the channel status is
//! republished.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{Channel, ChannelStatus};
use crate::config::ChannelConfig;
use crate::registry::SensorRegistry;
use crate::sink::{BroadcastSink, TelemetryEvent};
use crate::types::DeviceClass;
use crate::{AntError, Result};

/// How often silence is checked for.
const STALE_CHECK_INTERVAL: Duration = Duration::from_millis(250);
/// Events buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;
const CONTROL_CAPACITY: usize = 16;
/// Consecutive source errors before the driver gives up.
const MAX_ERRORS: u32 = 10;

/// Where inbound frames come from.
///
/// `next_frame` must be cancel safe: the driver drops the pending future
/// whenever another event wins the select.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Next raw frame for this channel, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Where encoded commands go.
#[async_trait]
pub trait CommandSink: Send + 'static {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl FrameSource for mpsc::Receiver<Vec<u8>> {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.recv().await)
    }
}

#[async_trait]
impl CommandSink for mpsc::Sender<Vec<u8>> {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| AntError::transport("command receiver dropped"))
    }
}

/// Requests a [`DriverHandle`] forwards to the channel task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Open { device_number: u16, class: DeviceClass },
    Close,
    SetPairing(bool),
    RequestCalibrate,
    SetAutoCalibrate(bool),
}

/// Handle to a running channel task.
pub struct DriverHandle {
    status: watch::Receiver<ChannelStatus>,
    events: broadcast::Sender<TelemetryEvent>,
    control: mpsc::Sender<Control>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// Latest published channel status.
    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    /// Watch receiver for status updates.
    pub fn status_updates(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events.subscribe()
    }

    /// Events as a stream. Lagging subscribers skip what they missed.
    pub fn events(&self) -> impl Stream<Item = TelemetryEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!("Event subscriber lagging: {}", e);
                    None
                }
            }
        })
    }

    pub async fn open(&self, device_number: u16, class: DeviceClass) -> Result<()> {
        self.send(Control::Open { device_number, class }).await
    }

    pub async fn close(&self) -> Result<()> {
        self.send(Control::Close).await
    }

    pub async fn send(&self, request: Control) -> Result<()> {
        self.control
            .send(request)
            .await
            .map_err(|_| AntError::transport("channel task has stopped"))
    }

    /// Token that stops the task when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Channel task failed: {}", e);
        }
    }
}

/// Spawns channel tasks.
pub struct ChannelDriver;

impl ChannelDriver {
    /// Spawn a task driving channel `number`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, C>(
        number: u8,
        registry: Arc<SensorRegistry>,
        config: ChannelConfig,
        source: F,
        commands: C,
    ) -> DriverHandle
    where
        F: FrameSource,
        C: CommandSink,
    {
        let sink = BroadcastSink::new(EVENT_CAPACITY);
        let events = sink.sender();
        let channel = Channel::new(number, registry, config, sink);

        let (status_tx, status_rx) = watch::channel(channel.status());
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Self::channel_task(
            channel,
            source,
            commands,
            control_rx,
            status_tx,
            cancel.clone(),
        ));

        DriverHandle { status: status_rx, events, control: control_tx, cancel, task }
    }

    async fn channel_task<F, C>(
        mut channel: Channel<BroadcastSink>,
        mut source: F,
        mut commands: C,
        mut control: mpsc::Receiver<Control>,
        status: watch::Sender<ChannelStatus>,
        cancel: CancellationToken,
    ) where
        F: FrameSource,
        C: CommandSink,
    {
        let number = channel.number();
        info!(channel = number, "Channel task started");

        let mut ticker = interval(STALE_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frame_count = 0u64;
        let mut error_count = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(channel = number, "Channel task cancelled");
                    break;
                }
                request = control.recv() => match request {
                    Some(request) => Self::apply(&mut channel, request),
                    None => {
                        debug!(channel = number, "Driver handle dropped, shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => channel.tick(Instant::now().into_std()),
                result = source.next_frame() => match result {
                    Ok(Some(raw)) => {
                        frame_count += 1;
                        error_count = 0;
                        trace!(channel = number, frame = frame_count, bytes = raw.len(), "Frame");
                        if let Err(e) = channel.receive(&raw, Instant::now().into_std()) {
                            warn!(channel = number, "Protocol error: {}", e);
                        }
                    }
                    Ok(None) => {
                        info!(channel = number, "Frame source ended after {} frames", frame_count);
                        break;
                    }
                    Err(e) => {
                        error_count += 1;
                        error!(
                            channel = number,
                            "Frame source error ({}/{}): {}", error_count, MAX_ERRORS, e
                        );

                        if error_count >= MAX_ERRORS {
                            error!(channel = number, "Too many frame source errors, shutting down");
                            break;
                        }

                        // Exponential backoff: 50ms, 100ms, 200ms, ...
                        let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                        tokio::time::sleep(backoff).await;
                    }
                },
            }

            for command in channel.take_commands() {
                trace!(channel = number, ?command, "Sending");
                if let Err(e) = commands.send(command.encode()).await {
                    warn!(channel = number, ?command, "Failed to send command: {}", e);
                }
            }

            status.send_replace(channel.status());
        }

        status.send_replace(channel.status());
        info!(channel = number, "Channel task ended (processed {} frames)", frame_count);
    }

    fn apply(channel: &mut Channel<BroadcastSink>, request: Control) {
        debug!(channel = channel.number(), ?request, "Control request");
        match request {
            Control::Open { device_number, class } => channel.open(device_number, class),
            Control::Close => channel.close(),
            Control::SetPairing(paired) => channel.set_pairing(paired),
            Control::RequestCalibrate => channel.request_calibrate(),
            Control::SetAutoCalibrate(auto_zero) => channel.set_auto_calibrate(auto_zero),
        }
    }
}
