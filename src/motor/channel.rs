// Motor channel contract: one motor controller driving one wheel

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Which wheel a channel drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelSide {
    Left,
    Right,
}

impl fmt::Display for WheelSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WheelSide::Left => write!(f, "left"),
            WheelSide::Right => write!(f, "right"),
        }
    }
}

/// Error types for motor channel communication
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Channel {channel} rejected {command}")]
    Rejected { channel: String, command: String },

    #[error("Status stream for channel {channel} is unavailable")]
    StatusUnavailable { channel: String },
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Write side of a motor controller
///
/// Only the supervisor calls these. Each call reports whether the
/// controller accepted the command.
pub trait MotorChannel: Send {
    /// Transport address, used in logs
    fn name(&self) -> &str;

    fn stop_motor(&mut self) -> Result<()>;

    fn set_mode(&mut self, mode: i32) -> Result<()>;

    fn set_encoder(&mut self, value: i32) -> Result<()>;

    /// Energize (`true`) or de-energize (`false`) the motor
    fn toggle_motor(&mut self, enable: bool) -> Result<()>;

    /// Target wheel speed in encoder ticks per second
    fn set_velocity(&mut self, value: f64) -> Result<()>;

    /// Open the raw status stream read by the fault monitor
    fn status_stream(&self) -> Result<Box<dyn StatusStream>>;
}

/// Read side of a motor controller: raw, unframed status output
pub trait StatusStream: Send {
    /// Block until bytes arrive or the stream's read timeout elapses.
    ///
    /// A timeout is reported as an `io::ErrorKind::TimedOut` error so the
    /// caller can check for shutdown between reads.
    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}
