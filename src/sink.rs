//! Outward publication of readings and status.
//!
//! Every channel is optional. A channel without a sink is skipped silently.

use crate::{Measurement, PublishFilter, Status};

/// Receives numeric readings. `f32::NAN` means the reading is unavailable.
pub trait Sink {
    /// Receives one reading.
    fn publish(&mut self, value: f32);
}

impl<F: FnMut(f32)> Sink for F {
    fn publish(&mut self, value: f32) {
        self(value)
    }
}

/// Receives the status text.
pub trait TextSink {
    /// Receives the new status text.
    fn publish(&mut self, text: &str);
}

impl<F: FnMut(&str)> TextSink for F {
    fn publish(&mut self, text: &str) {
        self(text)
    }
}

/// The set of sinks a driver publishes to.
#[derive(Default)]
pub struct Sinks<'a> {
    /// Distance in centimetres.
    pub distance: Option<&'a mut dyn Sink>,
    /// Signal strength.
    pub signal_strength: Option<&'a mut dyn Sink>,
    /// Chip temperature in degrees Celsius.
    pub temperature: Option<&'a mut dyn Sink>,
    /// Status text, see [`Status::as_str`].
    pub status: Option<&'a mut dyn TextSink>,
}

impl<'a> Sinks<'a> {
    /// No sinks configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes distance in centimetres.
    pub fn distance(mut self, sink: &'a mut dyn Sink) -> Self {
        self.distance = Some(sink);
        self
    }

    /// Publishes signal strength.
    pub fn signal_strength(mut self, sink: &'a mut dyn Sink) -> Self {
        self.signal_strength = Some(sink);
        self
    }

    /// Publishes chip temperature in degrees Celsius.
    pub fn temperature(mut self, sink: &'a mut dyn Sink) -> Self {
        self.temperature = Some(sink);
        self
    }

    /// Publishes the status text whenever it changes.
    pub fn status(mut self, sink: &'a mut dyn TextSink) -> Self {
        self.status = Some(sink);
        self
    }
}

// A numeric sink plus the last value it received.
struct Channel<'a> {
    sink: Option<&'a mut dyn Sink>,
    min_delta: f32,
    last: Option<f32>,
}

impl<'a> Channel<'a> {
    fn new(sink: Option<&'a mut dyn Sink>, min_delta: f32) -> Self {
        Self {
            sink,
            min_delta,
            last: None,
        }
    }

    fn publish(&mut self, value: f32) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Some(last) = self.last {
            let delta = if value > last { value - last } else { last - value };
            if delta < self.min_delta {
                return;
            }
        }
        sink.publish(value);
        self.last = Some(value);
    }

    fn publish_unavailable(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.publish(f32::NAN);
        }
        self.last = None;
    }
}

/// Publishes measurements and status to the configured sinks, suppressing repeats.
pub(crate) struct Outputs<'a> {
    distance: Channel<'a>,
    signal_strength: Channel<'a>,
    temperature: Channel<'a>,
    status: Option<&'a mut dyn TextSink>,
    last_status: Option<Status>,
    unavailable: bool,
}

impl<'a> Outputs<'a> {
    pub(crate) fn new(sinks: Sinks<'a>, filter: PublishFilter) -> Self {
        Self {
            distance: Channel::new(sinks.distance, filter.distance),
            signal_strength: Channel::new(sinks.signal_strength, filter.signal_strength),
            temperature: Channel::new(sinks.temperature, filter.temperature),
            status: sinks.status,
            last_status: None,
            unavailable: false,
        }
    }

    pub(crate) fn measurement(&mut self, measurement: &Measurement) {
        self.unavailable = false;
        self.distance.publish(f32::from(measurement.distance));
        self.signal_strength.publish(f32::from(measurement.strength));
        self.temperature.publish(measurement.temperature());
    }

    // Only the first call after a measurement reaches the sinks.
    pub(crate) fn unavailable(&mut self) {
        if self.unavailable {
            return;
        }
        self.unavailable = true;
        self.distance.publish_unavailable();
        self.signal_strength.publish_unavailable();
        self.temperature.publish_unavailable();
    }

    pub(crate) fn status(&mut self, status: Status) {
        if self.last_status == Some(status) {
            return;
        }
        if let Some(sink) = self.status.as_mut() {
            sink.publish(status.as_str());
            self.last_status = Some(status);
        }
    }

    // Lets the next `unavailable` call publish again.
    pub(crate) fn rearm(&mut self) {
        self.unavailable = false;
    }
}
