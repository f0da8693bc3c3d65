//! Keyed control commands
//! This module builds the frames written to the custom command channel

use thiserror::Error;

use crate::core::bluetooth::channel_map::Channel;
use crate::core::bluetooth::constants::{
    COMMAND_CODE_LEN, COMMAND_FRAME_SEPARATOR, COMMAND_FRAME_SIZE, COMMAND_FRAME_TERMINATOR,
};

/// Control commands the peripheral accepts on its custom command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Power the peripheral off
    Shutdown,
    /// Restart the peripheral
    Reboot,
}

impl ControlCommand {
    /// The control channel this command triggers
    pub fn channel(self) -> Channel {
        match self {
            Self::Shutdown => Channel::Shutdown,
            Self::Reboot => Channel::Reboot,
        }
    }

    /// Trailing hex digits of the control channel id
    pub fn code(self) -> String {
        let id = self.channel().channel_id().simple().to_string();
        id[id.len() - COMMAND_CODE_LEN..].to_string()
    }

    /// Encodes `<key>%&%<code>&#&`, zero padded to the frame size
    pub fn to_frame(self, device_key: &str) -> Result<Vec<u8>, FrameError> {
        let text = format!(
            "{}{}{}{}",
            device_key,
            COMMAND_FRAME_SEPARATOR,
            self.code(),
            COMMAND_FRAME_TERMINATOR
        );
        let mut frame = text.into_bytes();
        if frame.len() > COMMAND_FRAME_SIZE {
            return Err(FrameError {
                len: frame.len(),
                max: COMMAND_FRAME_SIZE,
            });
        }
        frame.resize(COMMAND_FRAME_SIZE, 0);
        Ok(frame)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Command frame is {len} bytes, the limit is {max}")]
pub struct FrameError {
    pub len: usize,
    pub max: usize,
}
