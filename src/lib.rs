#![cfg_attr(not(test), no_std)]

//! Driver for the Benewake TFmini Plus single-point LiDAR over UART.
//!
//! The host owns scheduling: call [`TfMiniPlus::init`] once, then
//! [`TfMiniPlus::update`] periodically (100 ms is a good default). Each update reads
//! whatever bytes are ready, decodes complete frames and publishes the readings to the
//! configured [`Sinks`].

use embedded_hal_async::delay::DelayNs;
use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};
use log::debug;

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod status;
pub use status::*;

pub mod frame;
pub use frame::{FirmwareVersion, Frame, FrameReader, Measurement, Reply};

mod command;
pub use command::Command;

mod sink;
use sink::Outputs;
pub use sink::{Sink, Sinks, TextSink};

/// Whether the sensor is currently expected to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Measurement frames are arriving.
    Online,
    /// Streaming was expected but no valid frame arrived recently.
    Offline,
    /// Frame rate is 0. No frames are expected.
    Paused,
}

// Counts corrupted frames and logs a summary at most once per window.
#[derive(Debug, Default)]
struct ErrorWindow {
    seen: u32,
    count: u32,
    window_start_ms: u64,
    last_log_ms: u64,
}

impl ErrorWindow {
    fn record(&mut self, discarded: u32, now_ms: u64) {
        if now_ms.saturating_sub(self.window_start_ms) > ERROR_LOG_WINDOW_MS {
            self.window_start_ms = now_ms;
            self.count = 0;
        }
        let new = discarded.wrapping_sub(self.seen);
        self.seen = discarded;
        if new == 0 {
            return;
        }
        self.count = self.count.saturating_add(new);
        if now_ms.saturating_sub(self.last_log_ms) >= ERROR_LOG_WINDOW_MS {
            log::warn!("TFmini Plus frame errors: {} in the last minute", self.count);
            self.last_log_ms = now_ms;
        }
    }
}

/// Represents a TFmini Plus LiDAR sensor.
///
/// This struct owns the serial port and the frame reader, applies the configuration,
/// polls for measurements and publishes them.
///
/// # Type Parameters
///
/// * `Serial`: The serial interface to the sensor. Reads happen only when
///   `embedded_io::ReadReady` reports data, so a tick never waits on the wire.
/// * `Delay`: Used for the bounded wait on command replies.
pub struct TfMiniPlus<'a, Serial, Delay> {
    serial: Serial,
    delay: Delay,
    config: Config,
    reader: FrameReader,
    outputs: Outputs<'a>,
    state: DeviceState,
    status: Status,
    last_measurement: Option<Measurement>,
    last_frame_ms: Option<u64>,
    // A frame arrived since the last tick. Frames can show up during command
    // waits, so they are timestamped by the next `update`.
    frame_seen: bool,
    pending: Option<Command>,
    reply: Option<Reply>,
    errors: ErrorWindow,
}

impl<'a, S, D> TfMiniPlus<'a, S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    /// Creates a new `TfMiniPlus` sensor instance.
    ///
    /// # Arguments
    ///
    /// * `serial`: The serial interface for communication with the sensor.
    /// * `delay`: Delay provider for command reply polling.
    /// * `config`: The configuration applied by [`TfMiniPlus::init`].
    /// * `sinks`: Where readings and status are published.
    pub fn new(serial: S, delay: D, config: Config, sinks: Sinks<'a>) -> Self {
        Self {
            serial,
            delay,
            config,
            reader: FrameReader::new(),
            outputs: Outputs::new(sinks, config.filter),
            state: DeviceState::Offline,
            status: Status::Offline,
            last_measurement: None,
            last_frame_ms: None,
            frame_seen: false,
            pending: None,
            reply: None,
            errors: ErrorWindow::default(),
        }
    }

    /// Applies the configuration to the sensor.
    ///
    /// This involves:
    /// - Discarding stale input.
    /// - A soft reset, if configured.
    /// - Setting the frame rate.
    /// - Saving the settings in the sensor, if configured.
    ///
    /// A command that times out or is refused is logged and the sequence continues.
    /// Only serial port failures are returned as errors.
    pub async fn init(&mut self) -> Result<(), Error> {
        self.flush_input().await?;

        if self.config.soft_reset {
            if let Err(e) = self.soft_reset().await {
                tolerate(e, "Soft reset")?;
            }
        }

        let rate = self.config.frame_rate;
        if let Err(e) = self.execute(Command::SetFrameRate(rate)).await {
            tolerate(e, "Setting frame rate")?;
        }

        if self.config.save_settings {
            if let Err(e) = self.execute(Command::SaveSettings).await {
                tolerate(e, "Saving settings")?;
            }
        }

        if rate.is_paused() {
            self.pause();
        } else if self.state != DeviceState::Online {
            // Waiting for the first frame.
            self.state = DeviceState::Offline;
            self.set_status(Status::Offline);
            self.outputs.unavailable();
        }

        debug!("TFmini Plus init sequence complete.");
        Ok(())
    }

    /// Processes everything the sensor sent since the last call.
    ///
    /// Every complete measurement frame updates the status and is published. If the
    /// sensor should be streaming but nothing valid arrived for over a second, it is
    /// marked offline and the numeric sinks receive `NaN` once.
    ///
    /// # Arguments
    ///
    /// * `now_ms`: A monotonic timestamp in milliseconds.
    pub async fn update(&mut self, now_ms: u64) -> Result<(), Error> {
        self.poll_input().await?;
        if core::mem::take(&mut self.frame_seen) {
            self.last_frame_ms = Some(now_ms);
        }
        self.errors.record(self.reader.discarded(), now_ms);

        if self.state == DeviceState::Paused {
            return Ok(());
        }

        let silent = match self.last_frame_ms {
            Some(at) => now_ms.saturating_sub(at) > OFFLINE_TIMEOUT_MS,
            None => true,
        };
        if silent {
            self.mark_offline("No valid frame within 1s");
        }
        Ok(())
    }

    /// Sets the measurement frame rate. A rate of 0 pauses the sensor.
    pub async fn set_frame_rate(&mut self, rate: FrameRate) -> Result<(), Error> {
        self.execute(Command::SetFrameRate(rate)).await?;
        self.config.frame_rate = rate;
        if rate.is_paused() {
            self.pause();
        } else if self.state == DeviceState::Paused {
            self.resume_streaming();
        }
        Ok(())
    }

    /// Reboots the sensor and gives it time to come back.
    pub async fn soft_reset(&mut self) -> Result<(), Error> {
        self.execute(Command::SoftReset).await?;
        self.delay.delay_ms(SOFT_RESET_SETTLE_MS).await;
        Ok(())
    }

    /// Persists the sensor's current settings in its flash.
    pub async fn save_settings(&mut self) -> Result<(), Error> {
        self.execute(Command::SaveSettings).await.map(|_| ())
    }

    /// Resets every sensor setting to its factory value.
    pub async fn restore_factory_settings(&mut self) -> Result<(), Error> {
        self.execute(Command::RestoreFactorySettings)
            .await
            .map(|_| ())
    }

    /// Switches the sensor's measurement output on or off.
    pub async fn set_output_enabled(&mut self, enabled: bool) -> Result<(), Error> {
        self.execute(Command::SetOutput(enabled)).await.map(|_| ())
    }

    /// Requests a single measurement. Meant for a paused sensor; the frame is picked up
    /// by the next [`TfMiniPlus::update`].
    pub async fn trigger(&mut self) -> Result<(), Error> {
        self.execute(Command::TriggerDetection).await.map(|_| ())
    }

    /// Retrieves the firmware version of the sensor.
    pub async fn firmware_version(&mut self) -> Result<FirmwareVersion, Error> {
        let reply = self.execute(Command::GetFirmwareVersion).await?;
        let version = reply
            .as_ref()
            .and_then(Reply::firmware_version)
            .ok_or(Error::UnexpectedReply)?;
        debug!(
            "Firmware version: {}.{}.{}",
            version.major, version.minor, version.revision
        );
        Ok(version)
    }

    /// Stops streaming without touching the configured frame rate.
    pub async fn sleep(&mut self) -> Result<(), Error> {
        log::info!("Putting TFmini Plus to sleep (frame rate 0)");
        self.execute(Command::SetFrameRate(FrameRate::PAUSED))
            .await
            .map_err(|e| {
                log::warn!("Sleep command failed: {:?}", e);
                e
            })?;
        self.pause();
        Ok(())
    }

    /// Restores the configured frame rate after [`TfMiniPlus::sleep`].
    pub async fn wake(&mut self) -> Result<(), Error> {
        let rate = self.config.frame_rate;
        log::info!("Waking TFmini Plus with frame rate {}", rate.hz());
        self.execute(Command::SetFrameRate(rate))
            .await
            .map_err(|e| {
                log::warn!("Wake command failed: {:?}", e);
                e
            })?;

        if self.config.save_settings {
            if let Err(e) = self.execute(Command::SaveSettings).await {
                tolerate(e, "Saving settings")?;
            }
        }

        if rate.is_paused() {
            self.pause();
        } else {
            self.resume_streaming();
            self.set_status(Status::Ready);
        }
        Ok(())
    }

    /// Last-known sensor status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether the sensor is streaming, silent or paused.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The most recent measurement, whatever its status.
    pub fn last_measurement(&self) -> Option<Measurement> {
        self.last_measurement
    }

    /// The configuration currently applied.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of corrupted frames dropped so far.
    pub fn corrupted_frames(&self) -> u32 {
        self.reader.discarded()
    }

    /// Gives back the serial port.
    pub fn release(self) -> S {
        self.serial
    }

    // Sends a command and, if it has one, waits for its reply.
    async fn execute(&mut self, command: Command) -> Result<Option<Reply>, Error> {
        self.flush_input().await?;

        let mut buffer = [0u8; MAX_COMMAND_LEN];
        let bytes = command.encode(&mut buffer);
        debug!("Executing command {:?}: {:02X?}", command, bytes);
        self.serial
            .write_all(bytes)
            .await
            .map_err(|_| Error::WriteFailure)?;
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?;

        if !command.expects_reply() {
            self.set_status(Status::Pass);
            return Ok(None);
        }

        let outcome = self.await_reply(command).await;
        match outcome {
            Ok(_) => self.set_status(Status::Pass),
            Err(Error::Timeout) => {
                log::warn!("Timeout waiting for reply to {:?}", command);
                self.set_status(Status::Timeout);
            }
            Err(Error::CommandFailed) | Err(Error::UnexpectedReply) => {
                log::warn!("TFmini Plus reported failure for {:?}: {:?}", command, outcome);
                self.set_status(Status::Fail);
            }
            Err(_) => {}
        }
        outcome
    }

    async fn await_reply(&mut self, command: Command) -> Result<Option<Reply>, Error> {
        self.pending = Some(command);
        self.reply = None;

        let mut waited = 0;
        let outcome = loop {
            if let Err(e) = self.poll_input().await {
                break Err(e);
            }
            if let Some(reply) = self.reply.take() {
                break command.verify(&reply).map(|()| Some(reply));
            }
            if waited >= COMMAND_TIMEOUT_MS {
                break Err(Error::Timeout);
            }
            self.delay.delay_ms(COMMAND_POLL_INTERVAL_MS).await;
            waited += COMMAND_POLL_INTERVAL_MS;
        };

        self.pending = None;
        outcome
    }

    // Feeds every ready byte to the frame reader and handles the frames it completes.
    async fn poll_input(&mut self) -> Result<(), Error> {
        let mut budget = MAX_TICK_BYTES;
        while budget > 0 && self.input_ready()? {
            let byte = self.read_byte().await?;
            budget -= 1;

            let mut next = self.reader.feed(byte);
            while let Some(frame) = next {
                self.dispatch(frame);
                next = self.reader.resume();
            }
        }
        Ok(())
    }

    async fn flush_input(&mut self) -> Result<(), Error> {
        let mut budget = MAX_TICK_BYTES;
        while budget > 0 && self.input_ready()? {
            self.read_byte().await?;
            budget -= 1;
        }
        self.reader.reset();
        Ok(())
    }

    fn input_ready(&mut self) -> Result<bool, Error> {
        self.serial.read_ready().map_err(|_| {
            log::error!("Serial port failed to report read readiness");
            Error::ReadFailure
        })
    }

    async fn read_byte(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        match self.serial.read(&mut byte).await {
            Ok(1) => Ok(byte[0]),
            Ok(_) => {
                log::error!("Serial port reported data but returned none");
                Err(Error::ReadFailure)
            }
            Err(_) => {
                log::error!("Serial read failed");
                Err(Error::ReadFailure)
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        match frame {
            Frame::Measurement(measurement) => self.handle_measurement(measurement),
            Frame::Reply(reply) => match self.pending {
                Some(command) if command.id() == reply.command_id() => {
                    debug!("Reply for {:?}: {:02X?}", command, reply.payload());
                    self.pending = None;
                    self.reply = Some(reply);
                }
                _ => debug!(
                    "Ignoring reply for command {:02X}, nothing is waiting for it",
                    reply.command_id()
                ),
            },
        }
    }

    fn handle_measurement(&mut self, measurement: Measurement) {
        self.frame_seen = true;
        if self.state == DeviceState::Offline {
            log::info!("TFmini Plus came online");
            self.state = DeviceState::Online;
        }

        let status = measurement.status();
        self.last_measurement = Some(measurement);
        self.set_status(status);

        if status.has_distance() {
            self.outputs.measurement(&measurement);
        } else {
            debug!(
                "Measurement flagged as {}: {:?}",
                status.as_str(),
                measurement
            );
            self.outputs.unavailable();
        }
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
        self.outputs.status(status);
    }

    fn mark_offline(&mut self, reason: &str) {
        if self.state == DeviceState::Offline {
            return;
        }
        log::warn!("TFmini Plus marked offline: {}", reason);
        self.state = DeviceState::Offline;
        self.outputs.unavailable();
    }

    fn pause(&mut self) {
        self.state = DeviceState::Paused;
        self.set_status(Status::Sleeping);
        self.outputs.rearm();
        self.outputs.unavailable();
    }

    fn resume_streaming(&mut self) {
        self.state = DeviceState::Offline;
        self.last_frame_ms = None;
        self.frame_seen = false;
        self.outputs.rearm();
    }
}

// Command timeouts and refusals only warrant a warning. Serial failures are returned.
fn tolerate(error: Error, what: &str) -> Result<(), Error> {
    match error {
        Error::ReadFailure | Error::WriteFailure => {
            log::error!("{} failed: {:?}", what, error);
            Err(error)
        }
        _ => {
            log::warn!("{} failed: {:?}, continuing", what, error);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::checksum;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        rx: VecDeque<u8>,
        tx: std::vec::Vec<u8>,
        replies: std::vec::Vec<(u8, std::vec::Vec<u8>)>,
    }

    // In-memory UART. Writing a command whose id has a scripted reply queues that reply.
    #[derive(Clone, Default)]
    struct MockSerial(Rc<RefCell<Wire>>);

    impl MockSerial {
        fn push(&self, bytes: &[u8]) {
            self.0.borrow_mut().rx.extend(bytes.iter().copied());
        }

        fn script(&self, command_id: u8, reply: std::vec::Vec<u8>) {
            self.0.borrow_mut().replies.push((command_id, reply));
        }

        fn sent(&self) -> std::vec::Vec<u8> {
            self.0.borrow().tx.clone()
        }
    }

    impl embedded_io::ErrorType for MockSerial {
        type Error = Infallible;
    }

    impl ReadReady for MockSerial {
        fn read_ready(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.borrow().rx.is_empty())
        }
    }

    impl Read for MockSerial {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            let mut wire = self.0.borrow_mut();
            let mut n = 0;
            while n < buf.len() {
                match wire.rx.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for MockSerial {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            let mut wire = self.0.borrow_mut();
            wire.tx.extend_from_slice(buf);
            if let Some(&id) = buf.get(2) {
                if let Some(pos) = wire.replies.iter().position(|(cmd, _)| *cmd == id) {
                    let (_, reply) = wire.replies.remove(pos);
                    wire.rx.extend(reply);
                }
            }
            Ok(buf.len())
        }
    }

    #[derive(Clone, Default)]
    struct MockDelay(Rc<Cell<u64>>);

    impl MockDelay {
        fn elapsed_ms(&self) -> u64 {
            self.0.get() / 1_000_000
        }
    }

    impl DelayNs for MockDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.0.set(self.0.get() + u64::from(ns));
        }
    }

    type Recorded = Rc<RefCell<std::vec::Vec<f32>>>;

    fn recorder() -> (Recorded, impl FnMut(f32)) {
        let values: Recorded = Rc::default();
        let sink = {
            let values = values.clone();
            move |v: f32| values.borrow_mut().push(v)
        };
        (values, sink)
    }

    fn measurement(distance: u16, strength: u16, raw_temperature: i16) -> std::vec::Vec<u8> {
        let mut frame = std::vec![0x59, 0x59];
        frame.extend_from_slice(&distance.to_le_bytes());
        frame.extend_from_slice(&strength.to_le_bytes());
        frame.extend_from_slice(&raw_temperature.to_le_bytes());
        frame.push(checksum(&frame));
        frame
    }

    fn reply(command_id: u8, payload: &[u8]) -> std::vec::Vec<u8> {
        let mut frame = std::vec![0x5A, (payload.len() + 4) as u8, command_id];
        frame.extend_from_slice(payload);
        frame.push(checksum(&frame));
        frame
    }

    fn rate(hz: u16) -> FrameRate {
        FrameRate::new(hz).unwrap()
    }

    #[test]
    fn init_sends_configured_commands() {
        let serial = MockSerial::default();
        let delay = MockDelay::default();
        serial.script(SOFT_RESET, reply(SOFT_RESET, &[0x00]));
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        serial.script(SAVE_SETTINGS, reply(SAVE_SETTINGS, &[0x00]));

        let config = Config::default().soft_reset(true).save_settings(true);
        let mut sensor = TfMiniPlus::new(serial.clone(), delay.clone(), config, Sinks::new());
        block_on(sensor.init()).unwrap();

        assert_eq!(
            serial.sent(),
            [
                0x5A, 0x04, 0x02, 0x60, // soft reset
                0x5A, 0x06, 0x03, 0x64, 0x00, 0xC7, // 100 Hz
                0x5A, 0x04, 0x11, 0x6F, // save
            ]
        );
        assert_eq!(delay.elapsed_ms(), u64::from(SOFT_RESET_SETTLE_MS));
        assert_eq!(sensor.state(), DeviceState::Offline);
        assert_eq!(sensor.status(), Status::Offline);
    }

    #[test]
    fn init_without_flags_only_sets_frame_rate() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0xE8, 0x03]));

        let config = Config::new(rate(1000));
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), config, Sinks::new());
        block_on(sensor.init()).unwrap();

        assert_eq!(serial.sent(), [0x5A, 0x06, 0x03, 0xE8, 0x03, 0x4E]);
    }

    #[test]
    fn init_continues_after_timeouts() {
        let serial = MockSerial::default();
        let delay = MockDelay::default();

        let config = Config::default().soft_reset(true).save_settings(true);
        let mut sensor = TfMiniPlus::new(serial.clone(), delay.clone(), config, Sinks::new());
        assert_eq!(block_on(sensor.init()), Ok(()));

        // All three commands still went out, each waited the full timeout.
        assert_eq!(serial.sent().len(), 4 + 6 + 4);
        assert_eq!(delay.elapsed_ms(), 3 * u64::from(COMMAND_TIMEOUT_MS));
        assert_eq!(sensor.status(), Status::Offline);
    }

    #[test]
    fn update_publishes_measurements() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        let (distances, mut on_distance) = recorder();
        let (strengths, mut on_strength) = recorder();
        let (temperatures, mut on_temperature) = recorder();

        let sinks = Sinks::new()
            .distance(&mut on_distance)
            .signal_strength(&mut on_strength)
            .temperature(&mut on_temperature);
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), sinks);
        block_on(sensor.init()).unwrap();

        serial.push(&measurement(1000, 500, 2048));
        serial.push(&measurement(1001, 510, 2248));
        block_on(sensor.update(100)).unwrap();

        assert_eq!(sensor.state(), DeviceState::Online);
        assert_eq!(sensor.status(), Status::Ready);
        assert_eq!(sensor.last_measurement().map(|m| m.distance), Some(1001));

        // The first value of each channel is the NaN published while waiting for data.
        assert_eq!(distances.borrow()[1..], [1000.0, 1001.0]);
        assert_eq!(strengths.borrow()[1..], [500.0, 510.0]);
        assert_eq!(temperatures.borrow()[1..], [0.0, 25.0]);
        assert!(distances.borrow()[0].is_nan());
    }

    #[test]
    fn frames_split_across_ticks() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        let (distances, mut on_distance) = recorder();
        let sinks = Sinks::new().distance(&mut on_distance);
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), sinks);
        block_on(sensor.init()).unwrap();

        let frame = measurement(734, 300, 2100);
        serial.push(&frame[..4]);
        block_on(sensor.update(100)).unwrap();
        assert_eq!(distances.borrow().len(), 1);

        serial.push(&frame[4..]);
        block_on(sensor.update(200)).unwrap();
        assert_eq!(distances.borrow()[1..], [734.0]);
    }

    #[test]
    fn corrupted_frames_are_not_published() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        let (distances, mut on_distance) = recorder();
        let sinks = Sinks::new().distance(&mut on_distance);
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), sinks);
        block_on(sensor.init()).unwrap();

        let mut bad = measurement(555, 500, 2048);
        bad[8] ^= 0x10;
        serial.push(&bad);
        serial.push(&measurement(1000, 500, 2048));
        block_on(sensor.update(100)).unwrap();

        assert_eq!(distances.borrow()[1..], [1000.0]);
        assert_eq!(sensor.corrupted_frames(), 1);
    }

    #[test]
    fn sentinel_distances_publish_unavailable() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        let (distances, mut on_distance) = recorder();
        let sinks = Sinks::new().distance(&mut on_distance);
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), sinks);
        block_on(sensor.init()).unwrap();

        serial.push(&measurement(1000, 500, 2048));
        serial.push(&measurement(0xFFFF, 20, 2048));
        block_on(sensor.update(100)).unwrap();
        assert_eq!(sensor.status(), Status::WeakSignal);

        // An undocumented code is still published as a number.
        serial.push(&measurement(0xFFFD, 500, 2048));
        block_on(sensor.update(200)).unwrap();
        assert_eq!(sensor.status(), Status::Unknown);

        let distances = distances.borrow();
        assert_eq!(distances.len(), 4);
        assert_eq!(distances[1], 1000.0);
        assert!(distances[2].is_nan());
        assert_eq!(distances[3], 65533.0);
    }

    #[test]
    fn offline_after_silence_then_back_online() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        let (distances, mut on_distance) = recorder();
        let texts = Rc::new(RefCell::new(std::vec::Vec::<std::string::String>::new()));
        let mut on_status = {
            let texts = texts.clone();
            move |s: &str| texts.borrow_mut().push(s.to_string())
        };
        let sinks = Sinks::new()
            .distance(&mut on_distance)
            .status(&mut on_status);
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), sinks);
        block_on(sensor.init()).unwrap();

        serial.push(&measurement(1000, 500, 2048));
        block_on(sensor.update(100)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Online);

        block_on(sensor.update(1000)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Online);

        block_on(sensor.update(1200)).unwrap();
        block_on(sensor.update(1300)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Offline);
        // Status is sticky while offline.
        assert_eq!(sensor.status(), Status::Ready);

        serial.push(&measurement(1000, 500, 2048));
        block_on(sensor.update(1400)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Online);

        let distances = distances.borrow();
        assert_eq!(distances.len(), 4);
        assert!(distances[0].is_nan());
        assert_eq!(distances[1], 1000.0);
        assert!(distances[2].is_nan());
        assert_eq!(distances[3], 1000.0);
        assert_eq!(*texts.borrow(), ["PASS", "OFFLINE", "READY"]);
    }

    #[test]
    fn paused_sensor_keeps_status_across_empty_ticks() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x00, 0x00]));
        let mut sensor = TfMiniPlus::new(
            serial.clone(),
            MockDelay::default(),
            Config::new(FrameRate::PAUSED),
            Sinks::new(),
        );
        block_on(sensor.init()).unwrap();
        assert_eq!(sensor.state(), DeviceState::Paused);
        assert_eq!(sensor.status(), Status::Sleeping);

        block_on(sensor.update(0)).unwrap();
        block_on(sensor.update(5000)).unwrap();
        assert_eq!(sensor.status(), Status::Sleeping);

        serial.push(&measurement(0xFFFF, 20, 2048));
        block_on(sensor.update(5100)).unwrap();
        assert_eq!(sensor.status(), Status::WeakSignal);

        for now in [5200, 8000, 20_000] {
            block_on(sensor.update(now)).unwrap();
            assert_eq!(sensor.status(), Status::WeakSignal);
            assert_eq!(sensor.state(), DeviceState::Paused);
        }
    }

    #[test]
    fn reply_resolves_only_its_own_command() {
        let serial = MockSerial::default();
        let delay = MockDelay::default();
        serial.script(SOFT_RESET, reply(SOFT_RESET, &[0x00]));
        // A second soft reset reply shows up after the frame rate command.
        serial.script(SET_FRAME_RATE, reply(SOFT_RESET, &[0x00]));

        let mut sensor =
            TfMiniPlus::new(serial.clone(), delay.clone(), Config::default(), Sinks::new());
        assert_eq!(block_on(sensor.soft_reset()), Ok(()));
        assert_eq!(sensor.status(), Status::Pass);

        assert_eq!(block_on(sensor.set_frame_rate(rate(50))), Err(Error::Timeout));
        assert_eq!(sensor.status(), Status::Timeout);
        assert_eq!(sensor.config().frame_rate.hz(), 100);
        assert_eq!(
            delay.elapsed_ms(),
            u64::from(SOFT_RESET_SETTLE_MS + COMMAND_TIMEOUT_MS)
        );
    }

    #[test]
    fn refused_command_is_reported() {
        let serial = MockSerial::default();
        serial.script(SAVE_SETTINGS, reply(SAVE_SETTINGS, &[0x01]));
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), Sinks::new());

        assert_eq!(block_on(sensor.save_settings()), Err(Error::CommandFailed));
        assert_eq!(sensor.status(), Status::Fail);
    }

    #[test]
    fn stale_input_is_flushed_before_a_command() {
        let serial = MockSerial::default();
        serial.push(&reply(RESTORE_FACTORY_SETTINGS, &[0x00]));
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), Sinks::new());

        assert_eq!(
            block_on(sensor.restore_factory_settings()),
            Err(Error::Timeout)
        );
    }

    #[test]
    fn measurements_during_a_command_wait_are_kept() {
        let serial = MockSerial::default();
        let mut response = measurement(420, 800, 2200);
        response.extend_from_slice(&reply(SET_FRAME_RATE, &[0x64, 0x00]));
        serial.script(SET_FRAME_RATE, response);

        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), Sinks::new());
        block_on(sensor.init()).unwrap();

        assert_eq!(sensor.state(), DeviceState::Online);
        assert_eq!(sensor.last_measurement().map(|m| m.distance), Some(420));
    }

    #[test]
    fn frame_during_init_counts_at_the_next_tick() {
        let serial = MockSerial::default();
        let mut response = measurement(420, 800, 2200);
        response.extend_from_slice(&reply(SET_FRAME_RATE, &[0x64, 0x00]));
        serial.script(SET_FRAME_RATE, response);
        let (distances, mut on_distance) = recorder();
        let sinks = Sinks::new().distance(&mut on_distance);
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), sinks);
        block_on(sensor.init()).unwrap();

        // The host clock is far from zero when the first tick runs.
        block_on(sensor.update(10_000)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Online);
        assert_eq!(*distances.borrow(), [420.0]);

        block_on(sensor.update(11_000)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Online);

        block_on(sensor.update(11_001)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Offline);
        assert_eq!(distances.borrow().len(), 2);
        assert!(distances.borrow()[1].is_nan());
    }

    #[test]
    fn error_window_counts_and_throttles() {
        let mut window = ErrorWindow::default();

        window.record(1, 0);
        assert_eq!((window.count, window.window_start_ms, window.last_log_ms), (1, 0, 0));

        window.record(3, 30_000);
        assert_eq!((window.count, window.window_start_ms, window.last_log_ms), (3, 0, 0));

        // Nothing new: the count holds.
        window.record(3, 45_000);
        assert_eq!(window.count, 3);

        // A new window starts and the summary is logged.
        window.record(4, 60_001);
        assert_eq!(
            (window.count, window.window_start_ms, window.last_log_ms),
            (1, 60_001, 60_001)
        );

        // Within a minute of the last summary: counted, not logged.
        window.record(5, 90_000);
        assert_eq!(
            (window.count, window.window_start_ms, window.last_log_ms),
            (2, 60_001, 60_001)
        );

        window.record(7, 120_002);
        assert_eq!(
            (window.count, window.window_start_ms, window.last_log_ms),
            (2, 120_002, 120_002)
        );
    }

    #[test]
    fn reads_firmware_version() {
        let serial = MockSerial::default();
        serial.script(GET_FIRMWARE_VERSION, reply(GET_FIRMWARE_VERSION, &[0x09, 0x01, 0x02]));
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), Sinks::new());

        assert_eq!(
            block_on(sensor.firmware_version()),
            Ok(FirmwareVersion {
                major: 2,
                minor: 1,
                revision: 9
            })
        );
        assert_eq!(serial.sent(), [0x5A, 0x04, 0x01, 0x5F]);
    }

    #[test]
    fn output_can_be_switched_off() {
        let serial = MockSerial::default();
        serial.script(ENABLE_OUTPUT, reply(ENABLE_OUTPUT, &[0x00]));
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), Sinks::new());

        assert_eq!(block_on(sensor.set_output_enabled(false)), Ok(()));
        assert_eq!(serial.sent(), [0x5A, 0x05, 0x07, 0x00, 0x66]);
    }

    #[test]
    fn sleep_and_wake() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        let (distances, mut on_distance) = recorder();
        let sinks = Sinks::new().distance(&mut on_distance);
        let mut sensor =
            TfMiniPlus::new(serial.clone(), MockDelay::default(), Config::default(), sinks);
        block_on(sensor.init()).unwrap();

        serial.push(&measurement(1000, 500, 2048));
        block_on(sensor.update(100)).unwrap();

        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x00, 0x00]));
        block_on(sensor.sleep()).unwrap();
        assert_eq!(sensor.state(), DeviceState::Paused);
        assert_eq!(sensor.status(), Status::Sleeping);
        assert_eq!(sensor.config().frame_rate.hz(), 100);

        block_on(sensor.update(5000)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Paused);

        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x64, 0x00]));
        block_on(sensor.wake()).unwrap();
        assert_eq!(sensor.state(), DeviceState::Offline);
        assert_eq!(sensor.status(), Status::Ready);

        serial.push(&measurement(1002, 500, 2048));
        block_on(sensor.update(5100)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Online);

        let distances = distances.borrow();
        assert!(distances[0].is_nan());
        assert_eq!(distances[1], 1000.0);
        assert!(distances[2].is_nan());
        assert_eq!(distances[3], 1002.0);
    }

    #[test]
    fn trigger_while_paused() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x00, 0x00]));
        let (distances, mut on_distance) = recorder();
        let sinks = Sinks::new().distance(&mut on_distance);
        let mut sensor = TfMiniPlus::new(
            serial.clone(),
            MockDelay::default(),
            Config::new(FrameRate::PAUSED),
            sinks,
        );
        block_on(sensor.init()).unwrap();

        block_on(sensor.trigger()).unwrap();
        assert!(serial.sent().ends_with(&[0x5A, 0x04, 0x04, 0x62]));

        serial.push(&measurement(88, 4000, 2048));
        block_on(sensor.update(100)).unwrap();
        assert_eq!(sensor.status(), Status::Ready);
        assert_eq!(sensor.state(), DeviceState::Paused);
        assert_eq!(distances.borrow().last(), Some(&88.0));
    }

    #[test]
    fn resuming_from_pause_waits_for_frames() {
        let serial = MockSerial::default();
        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x00, 0x00]));
        let mut sensor = TfMiniPlus::new(
            serial.clone(),
            MockDelay::default(),
            Config::new(FrameRate::PAUSED),
            Sinks::new(),
        );
        block_on(sensor.init()).unwrap();

        serial.script(SET_FRAME_RATE, reply(SET_FRAME_RATE, &[0x0A, 0x00]));
        block_on(sensor.set_frame_rate(rate(10))).unwrap();
        assert_eq!(sensor.state(), DeviceState::Offline);
        assert_eq!(sensor.config().frame_rate.hz(), 10);

        serial.push(&measurement(500, 500, 2048));
        block_on(sensor.update(100)).unwrap();
        assert_eq!(sensor.state(), DeviceState::Online);
    }
}
