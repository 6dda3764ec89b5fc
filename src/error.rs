#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The serial port failed to deliver a byte it reported as ready.
    ReadFailure,
    /// The serial port rejected a command write or flush.
    WriteFailure,
    /// No reply to a command arrived within the polling window.
    Timeout,
    /// The sensor replied with a failure status.
    CommandFailed,
    /// The sensor replied, but the reply did not echo what was sent.
    UnexpectedReply,
    /// The requested frame rate is not one the sensor supports.
    InvalidFrameRate(u16),
}
