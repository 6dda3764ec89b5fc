use crate::{
    DISTANCE_AMBIENT_SATURATION, DISTANCE_STRONG_SIGNAL, DISTANCE_WEAK_SIGNAL, MAX_DISTANCE_CM,
    MIN_DISTANCE_CM, STRENGTH_SATURATED,
};

/// Last-known health of the sensor.
///
/// Measurement frames produce one of the first seven variants. Command outcomes and
/// lifecycle changes record the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A normal in-range measurement.
    Ready,
    /// Signal strength too low for a reliable distance.
    WeakSignal,
    /// Receiver saturated by a strong return.
    StrongSignal,
    /// Ambient light saturation.
    AmbientSaturation,
    /// Distance below the measurement range.
    BelowRange,
    /// Distance above the measurement range.
    AboveRange,
    /// A reserved distance code the datasheet does not document.
    Unknown,
    /// The last command was acknowledged.
    Pass,
    /// The sensor reported a failure for the last command.
    Fail,
    /// The last command got no reply in time.
    Timeout,
    /// No valid frame recently.
    Offline,
    /// Streaming is paused.
    Sleeping,
}

impl Status {
    /// Classifies a measurement from its distance and strength fields.
    ///
    /// The sensor signals trouble through sentinel distances rather than a dedicated
    /// field, so the order of the checks matters.
    pub fn classify(distance: u16, strength: u16) -> Status {
        if distance == DISTANCE_WEAK_SIGNAL {
            Status::WeakSignal
        } else if strength == STRENGTH_SATURATED || distance == DISTANCE_STRONG_SIGNAL {
            Status::StrongSignal
        } else if distance == DISTANCE_AMBIENT_SATURATION {
            Status::AmbientSaturation
        } else if (distance as i16) < 0 {
            Status::Unknown
        } else if distance < MIN_DISTANCE_CM {
            Status::BelowRange
        } else if distance > MAX_DISTANCE_CM {
            Status::AboveRange
        } else {
            Status::Ready
        }
    }

    /// Whether the distance of a measurement with this status is a real reading rather
    /// than a sentinel.
    pub fn has_distance(self) -> bool {
        !matches!(
            self,
            Status::WeakSignal | Status::StrongSignal | Status::AmbientSaturation
        )
    }

    /// Text published on the status channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ready => "READY",
            Status::WeakSignal => "WEAK",
            Status::StrongSignal => "STRONG",
            Status::AmbientSaturation => "FLOOD",
            Status::BelowRange => "NEAR",
            Status::AboveRange => "FAR",
            Status::Unknown => "OTHER",
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Timeout => "TIMEOUT",
            Status::Offline => "OFFLINE",
            Status::Sleeping => "SLEEPING",
        }
    }
}
