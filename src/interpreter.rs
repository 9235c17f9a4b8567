//! Telemetry interpretation
//!
//! Turns two successive telemetry samples from the same device into physical
//! metrics. Every counter on the wire rolls over, so all differences go
//! through [`delta_u8`]/[`delta_u16`]. A sample that carries no new event
//! (zero event or time delta) counts towards a dropout; once the dropout
//! limit is reached the affected metrics read zero until data resumes.

use crate::codec::Telemetry;
use crate::config::ChannelConfig;
use crate::sink::Metric;
use crate::types::{delta_u8, delta_u16};

/// Approximation of π used by power meter firmware; keeping it makes our
/// watts agree with the head units.
pub const PI: f64 = 3.14159;

/// Torque ticks are 1/32 Nm.
const TORQUE_SCALE: f64 = 32.0;
/// Power meter periods tick at 2048 Hz.
const POWER_CLOCK_HZ: f64 = 2048.0;
/// Crank torque frequency periods tick at 2000 Hz.
const SRM_CLOCK_HZ: f64 = 2000.0;
/// Speed, cadence and heart rate event times tick at 1024 Hz.
const EVENT_CLOCK_HZ: f64 = 1024.0;

const SRM_MAX_WATTS: f64 = 2501.0;
const SRM_MAX_CADENCE: f64 = 256.0;

/// Rate and power from a torque page.
///
/// `events`, `period` and `torque` are the deltas between two pages; the rate
/// is crank cadence for crank torque and wheel rpm for wheel torque. Callers
/// guarantee `events` and `period` are non-zero.
pub fn torque_metrics(events: f64, period: f64, torque: f64) -> (f64, f64) {
    let nm = torque / (TORQUE_SCALE * events);
    let rate = POWER_CLOCK_HZ * 60.0 * events / period;
    let power = PI * nm * rate / 30.0;
    (rate, power)
}

/// Cadence and power from a crank torque frequency page.
///
/// `period` and `slope` must be non-zero.
pub fn torque_frequency_metrics(
    events: f64,
    period: f64,
    torque: f64,
    slope: f64,
    offset: f64,
) -> (f64, f64) {
    let time = period / SRM_CLOCK_HZ;
    let torque_frequency = torque / time - offset;
    let nm = 10.0 * torque_frequency / slope;
    let cadence = SRM_CLOCK_HZ * 60.0 * events / period;
    let power = PI * nm * cadence / 30.0;
    (cadence, power)
}

/// Revolutions per minute from a revolution count and a 1/1024 s time delta.
pub fn revolution_rate(revolutions: u16, time: u16) -> f64 {
    EVENT_CLOCK_HZ * 60.0 * revolutions as f64 / time as f64
}

/// Derives metrics from successive samples and tracks dropouts.
#[derive(Debug, Clone)]
pub struct TelemetryInterpreter {
    power_dropout_limit: u32,
    rate_dropout_limit: u32,
    srm_offset: f64,
    null_count: u32,
    // wheel half of a combined speed and cadence sensor
    dual_null_count: u32,
}

impl Default for TelemetryInterpreter {
    fn default() -> Self {
        Self::new(&ChannelConfig::default())
    }
}

impl TelemetryInterpreter {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            power_dropout_limit: config.power_dropout_limit,
            rate_dropout_limit: config.rate_dropout_limit,
            srm_offset: config.srm_offset,
            null_count: 0,
            dual_null_count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.null_count = 0;
        self.dual_null_count = 0;
    }

    /// Consecutive samples without new data.
    pub fn null_count(&self) -> u32 {
        self.null_count
    }

    /// Compare `current` against the previous sample and derive metrics.
    ///
    /// Without a previous sample of the same kind nothing can be differenced:
    /// the dropout counters restart and no metric is produced.
    pub fn interpret(&mut self, previous: Option<&Telemetry>, current: &Telemetry) -> Vec<Metric> {
        let previous = match previous {
            Some(previous) if previous.same_kind(current) => previous,
            _ => {
                self.reset();
                return Vec::new();
            }
        };

        let mut metrics = Vec::with_capacity(2);

        match (*previous, *current) {
            (
                Telemetry::StandardPower { event_count: last, .. },
                Telemetry::StandardPower { event_count, instant_power, .. },
            ) => {
                if delta_u8(event_count, last) != 0 {
                    self.null_count = 0;
                    metrics.push(Metric::Power(instant_power as f64));
                } else if self.power_dropout() {
                    metrics.push(Metric::Power(0.0));
                }
            }

            (
                Telemetry::CrankTorque {
                    event_count: last_events,
                    period: last_period,
                    torque: last_torque,
                    ..
                },
                Telemetry::CrankTorque { event_count, period, torque, .. },
            ) => {
                let events = delta_u8(event_count, last_events);
                let period = delta_u16(period, last_period);
                if events != 0 && period != 0 {
                    self.null_count = 0;
                    let torque = delta_u16(torque, last_torque);
                    let (cadence, power) =
                        torque_metrics(events as f64, period as f64, torque as f64);
                    metrics.push(Metric::Cadence(cadence));
                    metrics.push(Metric::Power(power));
                } else if self.power_dropout() {
                    metrics.push(Metric::Cadence(0.0));
                    metrics.push(Metric::Power(0.0));
                }
            }

            (
                Telemetry::WheelTorque {
                    event_count: last_events,
                    period: last_period,
                    torque: last_torque,
                    ..
                },
                Telemetry::WheelTorque { event_count, period, torque, .. },
            ) => {
                let events = delta_u8(event_count, last_events);
                let period = delta_u16(period, last_period);
                if events != 0 && period != 0 {
                    self.null_count = 0;
                    let torque = delta_u16(torque, last_torque);
                    let (rpm, power) = torque_metrics(events as f64, period as f64, torque as f64);
                    metrics.push(Metric::WheelRpm(rpm));
                    metrics.push(Metric::Power(power));
                } else if self.power_dropout() {
                    metrics.push(Metric::WheelRpm(0.0));
                    metrics.push(Metric::Power(0.0));
                }
            }

            (
                Telemetry::CrankTorqueFrequency {
                    event_count: last_events,
                    period: last_period,
                    torque: last_torque,
                    ..
                },
                Telemetry::CrankTorqueFrequency { event_count, slope, period, torque },
            ) => {
                let period = delta_u16(period, last_period);
                if period != 0 && slope != 0 {
                    self.null_count = 0;
                    let events = delta_u8(event_count, last_events);
                    let torque = delta_u16(torque, last_torque);
                    let (cadence, power) = torque_frequency_metrics(
                        events as f64,
                        period as f64,
                        torque as f64,
                        slope as f64,
                        self.srm_offset,
                    );
                    // spikes show up around event count rollover
                    let plausible = power > 0.0 && power < SRM_MAX_WATTS;
                    if plausible && (0.0..SRM_MAX_CADENCE).contains(&cadence) {
                        metrics.push(Metric::Power(power));
                        metrics.push(Metric::Cadence(cadence));
                    }
                } else if self.power_dropout() {
                    metrics.push(Metric::Power(0.0));
                    metrics.push(Metric::Cadence(0.0));
                }
            }

            (
                Telemetry::HeartRate { measurement_time: last, .. },
                Telemetry::HeartRate { measurement_time, heart_rate, .. },
            ) => {
                if delta_u16(measurement_time, last) != 0 {
                    self.null_count = 0;
                    metrics.push(Metric::HeartRate(heart_rate as f64));
                } else if self.rate_dropout() {
                    metrics.push(Metric::HeartRate(0.0));
                }
            }

            (
                Telemetry::Cadence { measurement_time: last_time, revolutions: last_revs },
                Telemetry::Cadence { measurement_time, revolutions },
            ) => {
                let time = delta_u16(measurement_time, last_time);
                if time != 0 {
                    self.null_count = 0;
                    let revs = delta_u16(revolutions, last_revs);
                    metrics.push(Metric::Cadence(revolution_rate(revs, time)));
                } else if self.rate_dropout() {
                    metrics.push(Metric::Cadence(0.0));
                }
            }

            (
                Telemetry::Speed { measurement_time: last_time, revolutions: last_revs },
                Telemetry::Speed { measurement_time, revolutions },
            ) => {
                let time = delta_u16(measurement_time, last_time);
                if time != 0 {
                    self.null_count = 0;
                    let revs = delta_u16(revolutions, last_revs);
                    metrics.push(Metric::WheelRpm(revolution_rate(revs, time)));
                } else if self.rate_dropout() {
                    metrics.push(Metric::WheelRpm(0.0));
                }
            }

            (
                Telemetry::SpeedCadence {
                    crank_time: last_crank_time,
                    crank_revolutions: last_crank_revs,
                    wheel_time: last_wheel_time,
                    wheel_revolutions: last_wheel_revs,
                },
                Telemetry::SpeedCadence {
                    crank_time,
                    crank_revolutions,
                    wheel_time,
                    wheel_revolutions,
                },
            ) => {
                let time = delta_u16(crank_time, last_crank_time);
                if time != 0 {
                    self.null_count = 0;
                    let revs = delta_u16(crank_revolutions, last_crank_revs);
                    metrics.push(Metric::Cadence(revolution_rate(revs, time)));
                } else if self.rate_dropout() {
                    metrics.push(Metric::Cadence(0.0));
                }

                let time = delta_u16(wheel_time, last_wheel_time);
                if time != 0 {
                    self.dual_null_count = 0;
                    let revs = delta_u16(wheel_revolutions, last_wheel_revs);
                    metrics.push(Metric::WheelRpm(revolution_rate(revs, time)));
                } else {
                    self.dual_null_count = self.dual_null_count.saturating_add(1);
                    if self.dual_null_count >= self.rate_dropout_limit {
                        metrics.push(Metric::WheelRpm(0.0));
                    }
                }
            }

            // unknown pages carry nothing to difference
            _ => {}
        }

        metrics
    }

    fn power_dropout(&mut self) -> bool {
        self.null_count = self.null_count.saturating_add(1);
        self.null_count >= self.power_dropout_limit
    }

    fn rate_dropout(&mut self) -> bool {
        self.null_count = self.null_count.saturating_add(1);
        self.null_count >= self.rate_dropout_limit
    }
}
