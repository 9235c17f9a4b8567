//! Metric coalescing

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::sink::{EventKind, Metric, MetricKind, TelemetryEvent};

/// Extension trait to coalesce metric updates on any telemetry event stream.
pub trait CoalesceExt: Stream<Item = TelemetryEvent> {
    /// Emit metrics at most once per `period` per channel and metric kind.
    ///
    /// "Latest wins": of several updates for the same channel and kind that
    /// arrive within one period, only the last is emitted. Notifications are
    /// never delayed or dropped.
    fn coalesce(self, period: Duration) -> Coalesce<Self>
    where
        Self: Sized,
    {
        Coalesce::new(self, period)
    }
}

impl<T: Stream<Item = TelemetryEvent>> CoalesceExt for T {}

pin_project! {
    /// Stream combinator returned by [`CoalesceExt::coalesce`].
    pub struct Coalesce<S> {
        #[pin]
        stream: S,
        interval: Interval,
        latest: BTreeMap<(u8, MetricKind), Metric>,
        ready: VecDeque<TelemetryEvent>,
        done: bool,
    }
}

impl<S: Stream<Item = TelemetryEvent>> Coalesce<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, latest: BTreeMap::new(), ready: VecDeque::new(), done: false }
    }
}

impl<S: Stream<Item = TelemetryEvent>> Stream for Coalesce<S> {
    type Item = TelemetryEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything available, folding metrics into the latest table
        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) => match event.kind {
                    EventKind::Metric(metric) => {
                        this.latest.insert((event.channel, metric.kind()), metric);
                    }
                    EventKind::Notification(_) => this.ready.push_back(event),
                },
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if let Some(event) = this.ready.pop_front() {
            return Poll::Ready(Some(event));
        }

        if this.latest.is_empty() {
            return if *this.done { Poll::Ready(None) } else { Poll::Pending };
        }

        // Flush without waiting once the source has ended
        if !*this.done && this.interval.poll_tick(cx).is_pending() {
            return Poll::Pending;
        }

        let latest = std::mem::take(this.latest);
        this.ready.extend(
            latest
                .into_iter()
                .map(|((channel, _), metric)| TelemetryEvent::metric(channel, metric)),
        );
        Poll::Ready(this.ready.pop_front())
    }
}
