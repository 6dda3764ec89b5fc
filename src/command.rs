use crate::frame::{checksum, Reply};
use crate::{
    Error, FrameRate, COMMAND_HEADER, ENABLE_OUTPUT, GET_FIRMWARE_VERSION, MAX_COMMAND_LEN,
    RESTORE_FACTORY_SETTINGS, SAVE_SETTINGS, SET_FRAME_RATE, SOFT_RESET, TRIGGER_DETECTION,
};

/// A command the host can send to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for the firmware version.
    GetFirmwareVersion,
    /// Reboot the sensor.
    SoftReset,
    /// Change how many measurement frames the sensor streams per second.
    SetFrameRate(FrameRate),
    /// Request a single measurement while streaming is paused.
    TriggerDetection,
    /// Switch the measurement output on or off.
    SetOutput(bool),
    /// Reset every setting to its factory value.
    RestoreFactorySettings,
    /// Persist the current settings in the sensor's flash.
    SaveSettings,
}

impl Command {
    /// Identifier byte of this command, echoed in its reply.
    pub fn id(&self) -> u8 {
        match self {
            Command::GetFirmwareVersion => GET_FIRMWARE_VERSION,
            Command::SoftReset => SOFT_RESET,
            Command::SetFrameRate(_) => SET_FRAME_RATE,
            Command::TriggerDetection => TRIGGER_DETECTION,
            Command::SetOutput(_) => ENABLE_OUTPUT,
            Command::RestoreFactorySettings => RESTORE_FACTORY_SETTINGS,
            Command::SaveSettings => SAVE_SETTINGS,
        }
    }

    /// Whether the sensor answers this command with a reply frame. A triggered
    /// detection is answered with an ordinary measurement frame instead.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::TriggerDetection)
    }

    /// Writes the command frame into `buffer` and returns the bytes to send.
    ///
    /// Layout: `5A LEN ID PARAMS.. CS`, where `CS` is the sum of the preceding bytes.
    pub fn encode<'b>(&self, buffer: &'b mut [u8; MAX_COMMAND_LEN]) -> &'b [u8] {
        buffer.fill(0);
        buffer[0] = COMMAND_HEADER;
        buffer[2] = self.id();
        let len = match *self {
            Command::SetFrameRate(rate) => {
                buffer[3..5].copy_from_slice(&rate.hz().to_le_bytes());
                6
            }
            Command::SetOutput(enabled) => {
                buffer[3] = u8::from(enabled);
                5
            }
            _ => 4,
        };
        buffer[1] = len as u8;
        buffer[len - 1] = checksum(&buffer[..len - 1]);
        &buffer[..len]
    }

    /// Checks that `reply` acknowledges this command.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the sensor accepted the command.
    /// * `Err(Error::CommandFailed)` if it reported a failure.
    /// * `Err(Error::UnexpectedReply)` if the reply does not match what was sent.
    pub fn verify(&self, reply: &Reply) -> Result<(), Error> {
        if reply.command_id() != self.id() {
            return Err(Error::UnexpectedReply);
        }

        match *self {
            Command::SoftReset | Command::SaveSettings | Command::RestoreFactorySettings => {
                match reply.result_code() {
                    Some(0) => Ok(()),
                    Some(_) => Err(Error::CommandFailed),
                    None => Err(Error::UnexpectedReply),
                }
            }
            Command::SetFrameRate(rate) if reply.payload_u16() == Some(rate.hz()) => Ok(()),
            Command::SetOutput(enabled) if reply.result_code() == Some(u8::from(enabled)) => Ok(()),
            Command::GetFirmwareVersion if reply.firmware_version().is_some() => Ok(()),
            _ => Err(Error::UnexpectedReply),
        }
    }
}
