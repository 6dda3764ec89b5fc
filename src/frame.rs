//! Frame assembly and decoding for the TFmini Plus UART protocol.
//!
//! Two frame shapes arrive from the sensor:
//!
//! ```text
//! measurement: 59 59 DIST_L DIST_H STRENGTH_L STRENGTH_H TEMP_L TEMP_H CS
//! reply:       5A LEN ID PAYLOAD.. CS
//! ```
//!
//! `CS` is the sum of every preceding byte of the frame, modulo 256. Nothing leaves
//! this module without a matching checksum.

use heapless::{Deque, Vec};

use crate::{
    Status, COMMAND_HEADER, DATA_HEADER, MAX_FRAME_LEN, MAX_REPLY_PAYLOAD, MEASUREMENT_FRAME_LEN,
    MIN_REPLY_LEN, TEMPERATURE_DIVISOR, TEMPERATURE_OFFSET,
};

// Bytes waiting to be rescanned after a resync. One discarded frame plus whatever
// was still queued behind it always fits.
const REPLAY_CAPACITY: usize = 2 * MAX_FRAME_LEN;

/// Sum of `bytes` modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// A single reading from a measurement frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Distance in centimetres, or one of the sentinel codes.
    pub distance: u16,
    /// Signal strength (amplitude).
    pub strength: u16,
    /// Chip temperature as reported, see [`Measurement::temperature`].
    pub raw_temperature: i16,
}

impl Measurement {
    fn decode(frame: &[u8]) -> Measurement {
        Measurement {
            distance: u16::from_le_bytes([frame[2], frame[3]]),
            strength: u16::from_le_bytes([frame[4], frame[5]]),
            raw_temperature: i16::from_le_bytes([frame[6], frame[7]]),
        }
    }

    /// Chip temperature in degrees Celsius.
    pub fn temperature(&self) -> f32 {
        f32::from(self.raw_temperature) / TEMPERATURE_DIVISOR - TEMPERATURE_OFFSET
    }

    /// Health classification of this reading.
    pub fn status(&self) -> Status {
        Status::classify(self.distance, self.strength)
    }
}

/// The sensor's answer to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    command_id: u8,
    payload: Vec<u8, MAX_REPLY_PAYLOAD>,
}

impl Reply {
    fn decode(frame: &[u8]) -> Option<Reply> {
        let payload = Vec::from_slice(&frame[3..frame.len() - 1]).ok()?;
        Some(Reply {
            command_id: frame[2],
            payload,
        })
    }

    /// Identifier of the command this reply answers.
    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    /// Bytes between the command id and the checksum.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// First payload byte. For reset and save commands `0` means success.
    pub fn result_code(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Little-endian `u16` at the start of the payload.
    pub fn payload_u16(&self) -> Option<u16> {
        match self.payload.as_slice() {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// Firmware version carried by a version reply.
    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        match self.payload.as_slice() {
            [revision, minor, major, ..] => Some(FirmwareVersion {
                major: *major,
                minor: *minor,
                revision: *revision,
            }),
            _ => None,
        }
    }
}

/// Sensor firmware version, `major.minor.revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Revision, the lowest byte of the version.
    pub revision: u8,
}

/// A checksum-validated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Measurement(Measurement),
    Reply(Reply),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// Looking for the first header byte
    Scanning,
    /// Got one 0x59, need a second
    DataHeader,
    /// Got 0x5A, next byte is the length
    CommandHeader,
    /// Collecting up to `expected_len` bytes
    Body,
}

/// Turns a byte stream into validated frames.
///
/// On a bad checksum or an impossible length the partial frame is dropped and every
/// byte after its first header byte is scanned again, so a real frame hiding inside
/// the discarded span is still found.
#[derive(Debug, Clone)]
pub struct FrameReader {
    state: SyncState,
    buffer: Vec<u8, MAX_FRAME_LEN>,
    expected_len: usize,
    checksum: u8,
    replay: Deque<u8, REPLAY_CAPACITY>,
    discarded: u32,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a new frame reader
    pub fn new() -> Self {
        Self {
            state: SyncState::Scanning,
            buffer: Vec::new(),
            expected_len: 0,
            checksum: 0,
            replay: Deque::new(),
            discarded: 0,
        }
    }

    /// Drop the partial frame and any bytes queued for rescanning
    pub fn reset(&mut self) {
        self.restart();
        self.replay.clear();
    }

    /// Number of frames dropped for a bad checksum or length since creation.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    /// Feed a single byte to the reader.
    ///
    /// Returns a frame when this byte completes one. If it does, bytes set aside by an
    /// earlier resync may still hold more frames: drain them with [`FrameReader::resume`].
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        if self.replay.is_full() {
            self.replay.pop_front();
        }
        let _ = self.replay.push_back(byte);
        self.resume()
    }

    /// Continue with queued bytes without feeding a new one.
    pub fn resume(&mut self) -> Option<Frame> {
        while let Some(byte) = self.replay.pop_front() {
            if let Some(frame) = self.step(byte) {
                return Some(frame);
            }
        }
        None
    }

    /// Every frame completed by `bytes`, in order.
    pub fn feed_all<'r>(&'r mut self, bytes: &'r [u8]) -> Frames<'r> {
        Frames {
            reader: self,
            bytes: bytes.iter(),
        }
    }

    fn step(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            SyncState::Scanning => {
                match byte {
                    DATA_HEADER => self.begin(byte, SyncState::DataHeader),
                    COMMAND_HEADER => self.begin(byte, SyncState::CommandHeader),
                    _ => {}
                }
                None
            }
            SyncState::DataHeader => {
                self.accept(byte);
                if byte == DATA_HEADER {
                    self.expected_len = MEASUREMENT_FRAME_LEN;
                    self.state = SyncState::Body;
                } else {
                    self.resync();
                }
                None
            }
            SyncState::CommandHeader => {
                self.accept(byte);
                let len = usize::from(byte);
                if (MIN_REPLY_LEN..=MAX_FRAME_LEN).contains(&len) {
                    self.expected_len = len;
                    self.state = SyncState::Body;
                } else {
                    log::debug!("Reply length {} out of range, resyncing", len);
                    self.discarded = self.discarded.wrapping_add(1);
                    self.resync();
                }
                None
            }
            SyncState::Body => {
                if !self.accept(byte) {
                    self.resync();
                    return None;
                }
                if let Some(measurement) = self.measurement_inside_reply() {
                    log::debug!("Measurement frame inside an unfinished reply, dropping the reply");
                    self.discarded = self.discarded.wrapping_add(1);
                    self.restart();
                    return Some(Frame::Measurement(measurement));
                }
                if self.buffer.len() < self.expected_len {
                    return None;
                }
                match self.complete() {
                    Some(frame) => {
                        match self.data_header_inside_reply() {
                            Some(start) => self.replay_from(start),
                            None => self.restart(),
                        }
                        Some(frame)
                    }
                    None => {
                        self.discarded = self.discarded.wrapping_add(1);
                        self.resync();
                        None
                    }
                }
            }
        }
    }

    fn begin(&mut self, byte: u8, state: SyncState) {
        self.restart();
        self.accept(byte);
        self.state = state;
    }

    fn accept(&mut self, byte: u8) -> bool {
        self.checksum = self.checksum.wrapping_add(byte);
        self.buffer.push(byte).is_ok()
    }

    fn complete(&self) -> Option<Frame> {
        let (&received, _) = self.buffer.split_last()?;
        let computed = self.checksum.wrapping_sub(received);
        if computed != received {
            log::debug!(
                "Bad checksum: calculated {:02X}, received {:02X}. Frame: {:02X?}",
                computed,
                received,
                self.buffer.as_slice()
            );
            return None;
        }

        match self.buffer[0] {
            DATA_HEADER => Some(Frame::Measurement(Measurement::decode(&self.buffer))),
            _ => Reply::decode(&self.buffer).map(Frame::Reply),
        }
    }

    // A reply header can be a false match inside corrupted data, and its length byte
    // may then claim up to 32 bytes. A valid measurement frame ending inside that
    // body wins over the unfinished reply.
    fn measurement_inside_reply(&self) -> Option<Measurement> {
        if self.buffer.first() != Some(&COMMAND_HEADER) {
            return None;
        }
        let start = self.buffer.len().checked_sub(MEASUREMENT_FRAME_LEN)?;
        if start == 0 {
            return None;
        }
        let tail = &self.buffer[start..];
        let (&received, body) = tail.split_last()?;
        if body[..2] == [DATA_HEADER, DATA_HEADER] && checksum(body) == received {
            Some(Measurement::decode(tail))
        } else {
            None
        }
    }

    // Offset of a `59 59` pair inside a completed reply, which may be the start of a
    // measurement frame the reply overlapped.
    fn data_header_inside_reply(&self) -> Option<usize> {
        if self.buffer.first() != Some(&COMMAND_HEADER) {
            return None;
        }
        self.buffer
            .windows(2)
            .skip(1)
            .position(|pair| pair == [DATA_HEADER, DATA_HEADER])
            .map(|i| i + 1)
    }

    // Queue everything after the first header byte for rescanning, ahead of bytes
    // that were already waiting.
    fn resync(&mut self) {
        self.replay_from(1);
    }

    fn replay_from(&mut self, start: usize) {
        for &byte in self.buffer.iter().skip(start).rev() {
            if self.replay.push_front(byte).is_err() {
                break;
            }
        }
        self.restart();
    }

    fn restart(&mut self) {
        self.state = SyncState::Scanning;
        self.buffer.clear();
        self.expected_len = 0;
        self.checksum = 0;
    }
}

/// Iterator returned by [`FrameReader::feed_all`].
pub struct Frames<'r> {
    reader: &'r mut FrameReader,
    bytes: core::slice::Iter<'r, u8>,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if let Some(frame) = self.reader.resume() {
            return Some(frame);
        }
        for &byte in self.bytes.by_ref() {
            if let Some(frame) = self.reader.feed(byte) {
                return Some(frame);
            }
        }
        None
    }
}
