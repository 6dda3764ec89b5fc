// DATA_HEADER is sent twice to mark the start of a measurement frame.
pub const DATA_HEADER: u8 = 0x59;

// COMMAND_HEADER marks the start of a command frame (host to sensor) or of a reply
// frame (sensor to host). The byte after it is the total frame length.
pub const COMMAND_HEADER: u8 = 0x5A;

// MEASUREMENT_FRAME_LEN is the total length of a measurement frame, checksum included:
// 59 59 DIST_L DIST_H STRENGTH_L STRENGTH_H TEMP_L TEMP_H CS
pub const MEASUREMENT_FRAME_LEN: usize = 9;

// MIN_REPLY_LEN is the shortest reply: header, length, command id, checksum.
pub const MIN_REPLY_LEN: usize = 4;

// MAX_FRAME_LEN bounds any frame accepted from the wire. A reply length byte above
// this is treated as corruption.
pub const MAX_FRAME_LEN: usize = 32;

// MAX_REPLY_PAYLOAD is what remains of MAX_FRAME_LEN once header, length, id and
// checksum are taken out.
pub const MAX_REPLY_PAYLOAD: usize = MAX_FRAME_LEN - MIN_REPLY_LEN;

// MAX_COMMAND_LEN is the longest command this driver sends (set frame rate).
pub const MAX_COMMAND_LEN: usize = 6;

// Command identifiers, third byte of every command and reply frame.
pub const GET_FIRMWARE_VERSION: u8 = 0x01;
pub const SOFT_RESET: u8 = 0x02;
pub const SET_FRAME_RATE: u8 = 0x03;
pub const TRIGGER_DETECTION: u8 = 0x04;
pub const ENABLE_OUTPUT: u8 = 0x07;
pub const RESTORE_FACTORY_SETTINGS: u8 = 0x10;
pub const SAVE_SETTINGS: u8 = 0x11;

// Frame rates the sensor accepts. Every nonzero rate divides the internal 1 kHz tick.
pub const VALID_FRAME_RATES: [u16; 14] = [0, 1, 2, 5, 10, 20, 25, 50, 100, 125, 200, 250, 500, 1000];

// DEFAULT_FRAME_RATE is the rate the sensor ships with.
pub const DEFAULT_FRAME_RATE: u16 = 100;

// Temperature is reported in eighths of a degree, offset by 256 °C.
pub const TEMPERATURE_DIVISOR: f32 = 8.0;
pub const TEMPERATURE_OFFSET: f32 = 256.0;

// Operating range of the sensor in centimetres.
pub const MIN_DISTANCE_CM: u16 = 10;
pub const MAX_DISTANCE_CM: u16 = 1200;

// Distance sentinels the sensor reports instead of a measurement (-1, -2 and -4 as i16).
pub const DISTANCE_WEAK_SIGNAL: u16 = 0xFFFF;
pub const DISTANCE_STRONG_SIGNAL: u16 = 0xFFFE;
pub const DISTANCE_AMBIENT_SATURATION: u16 = 0xFFFC;

// A strength of 0xFFFF (-1) means the receiver is saturated.
pub const STRENGTH_SATURATED: u16 = 0xFFFF;

// How long to poll for a command reply before giving up.
pub const COMMAND_TIMEOUT_MS: u32 = 1000;

// Polling interval while waiting for a command reply.
pub const COMMAND_POLL_INTERVAL_MS: u32 = 1;

// Time the sensor needs to reboot after a soft reset.
pub const SOFT_RESET_SETTLE_MS: u32 = 50;

// With a nonzero frame rate, no valid frame for this long marks the device offline.
pub const OFFLINE_TIMEOUT_MS: u64 = 1000;

// Corrupted frames are summarised in the log at most once per window.
pub const ERROR_LOG_WINDOW_MS: u64 = 60_000;

// Upper bound on bytes consumed by a single tick.
pub const MAX_TICK_BYTES: usize = 1024;
