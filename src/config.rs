use crate::{Error, DEFAULT_FRAME_RATE, VALID_FRAME_RATES};

/// A measurement frame rate the TFmini Plus accepts, in frames per second.
///
/// Only rates that divide the sensor's internal 1 kHz tick are valid. A rate of `0`
/// pauses the output stream; measurements are then only produced on a trigger.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct FrameRate(u16);

impl FrameRate {
    /// Output paused.
    pub const PAUSED: FrameRate = FrameRate(0);

    /// Creates a validated frame rate.
    ///
    /// # Arguments
    ///
    /// * `hz` - The desired number of measurement frames per second.
    ///
    /// # Returns
    ///
    /// * `Ok(FrameRate)` if `hz` is one of the supported rates.
    /// * `Err(Error::InvalidFrameRate)` otherwise.
    pub fn new(hz: u16) -> Result<FrameRate, Error> {
        if VALID_FRAME_RATES.contains(&hz) && (hz == 0 || 1000 % hz == 0) {
            Ok(FrameRate(hz))
        } else {
            log::error!(
                "Frame rate {} is not supported, expected one of {:?}",
                hz,
                VALID_FRAME_RATES
            );
            Err(Error::InvalidFrameRate(hz))
        }
    }

    /// The rate in frames per second.
    pub fn hz(self) -> u16 {
        self.0
    }

    /// Whether this rate stops the sensor from streaming.
    pub fn is_paused(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u16> for FrameRate {
    type Error = Error;

    fn try_from(hz: u16) -> Result<FrameRate, Error> {
        FrameRate::new(hz)
    }
}

impl Default for FrameRate {
    /// Returns the factory default of 100 Hz.
    fn default() -> FrameRate {
        FrameRate(DEFAULT_FRAME_RATE)
    }
}

/// Minimum change a numeric reading must show before it is published again.
///
/// With the default of `0.0` everywhere, every decoded frame is published.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct PublishFilter {
    /// Minimum distance change in centimetres.
    pub distance: f32,
    /// Minimum signal strength change.
    pub signal_strength: f32,
    /// Minimum temperature change in degrees Celsius.
    pub temperature: f32,
}

impl PublishFilter {
    /// Thresholds that suppress the sensor's frame-to-frame jitter: 0.1 cm, 1 unit of
    /// strength and 0.05 °C.
    pub fn coarse() -> PublishFilter {
        PublishFilter {
            distance: 0.1,
            signal_strength: 1.0,
            temperature: 0.05,
        }
    }
}

/// Configuration settings for the TFmini Plus sensor.
///
/// Applied once by [`crate::TfMiniPlus::init`]: each flag results in exactly one
/// command sent to the sensor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// The measurement frame rate.
    pub frame_rate: FrameRate,
    /// Soft reset the sensor before configuring it.
    pub soft_reset: bool,
    /// Persist the configuration in the sensor's own flash.
    pub save_settings: bool,
    /// Suppression of near-identical readings on the numeric sinks.
    pub filter: PublishFilter,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `frame_rate` - The `FrameRate` the sensor should stream at.
    ///
    /// # Returns
    ///
    /// A new `Config` with no soft reset, no settings persistence and no publish filter.
    pub fn new(frame_rate: FrameRate) -> Config {
        Config {
            frame_rate,
            soft_reset: false,
            save_settings: false,
            filter: PublishFilter::default(),
        }
    }

    /// Sets the frame rate.
    pub fn frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Requests a soft reset during initialization.
    pub fn soft_reset(mut self, soft_reset: bool) -> Self {
        self.soft_reset = soft_reset;
        self
    }

    /// Requests that the sensor saves its settings during initialization.
    pub fn save_settings(mut self, save_settings: bool) -> Self {
        self.save_settings = save_settings;
        self
    }

    /// Sets the publish filter.
    pub fn filter(mut self, filter: PublishFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Provides default configuration values for the TFmini Plus sensor.
impl Default for Config {
    /// Returns the default configuration.
    ///
    /// The default configuration streams at 100 Hz and sends neither a soft reset nor a
    /// save command.
    fn default() -> Config {
        Config::new(FrameRate::default())
    }
}
