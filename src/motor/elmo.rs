// Elmo motor controller over RS-232
//
// ASCII command set, each command terminated by ';'. Commands are written
// blind: whatever the controller sends back is consumed by the fault
// monitor through a cloned port handle.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{self, SerialPort};
use tracing::debug;

use super::channel::{MotorChannel, Result, StatusStream};

/// Default serial configuration for Elmo controllers
pub const DEFAULT_BAUDRATE: u32 = 19_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Command terminator
const TERMINATOR: char = ';';

/// Subset of the controller's command set used by the runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// ST: stop motion
    Stop,
    /// UM: unit (operating) mode
    Mode(i32),
    /// PX: main position (encoder) counter
    Encoder(i32),
    /// MO: motor on/off
    MotorOn(bool),
    /// JV: jog velocity in counts per second
    JogVelocity(i64),
    /// BG: begin motion with the latest parameters
    Begin,
}

impl Command {
    /// Wire form of the command, terminator included
    pub fn encode(&self) -> String {
        let body = match *self {
            Command::Stop => "ST".to_string(),
            Command::Mode(mode) => format!("UM={}", mode),
            Command::Encoder(value) => format!("PX={}", value),
            Command::MotorOn(on) => format!("MO={}", u8::from(on)),
            Command::JogVelocity(value) => format!("JV={}", value),
            Command::Begin => "BG".to_string(),
        };
        format!("{}{}", body, TERMINATOR)
    }
}

/// Convert a tick rate to the controller's integer jog velocity
fn jog_velocity(ticks_per_second: f64) -> i64 {
    // `as` saturates on overflow and maps NaN to 0
    ticks_per_second.round() as i64
}

/// One Elmo controller on its own serial port
pub struct ElmoChannel {
    name: String,
    port: Box<dyn SerialPort>,
}

impl ElmoChannel {
    /// Open a connection to the controller
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            name: port_name.to_string(),
            port,
        })
    }

    /// Write a single command
    pub fn send(&mut self, command: Command) -> Result<()> {
        let wire = command.encode();
        debug!("{} <- {}", self.name, wire);
        self.port.write_all(wire.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}

impl MotorChannel for ElmoChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_motor(&mut self) -> Result<()> {
        self.send(Command::Stop)
    }

    fn set_mode(&mut self, mode: i32) -> Result<()> {
        self.send(Command::Mode(mode))
    }

    fn set_encoder(&mut self, value: i32) -> Result<()> {
        self.send(Command::Encoder(value))
    }

    fn toggle_motor(&mut self, enable: bool) -> Result<()> {
        self.send(Command::MotorOn(enable))
    }

    fn set_velocity(&mut self, value: f64) -> Result<()> {
        self.send(Command::JogVelocity(jog_velocity(value)))?;
        self.send(Command::Begin)
    }

    fn status_stream(&self) -> Result<Box<dyn StatusStream>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(ElmoStatusStream { port }))
    }
}

/// Cloned handle on the controller's port, read-only by convention
pub struct ElmoStatusStream {
    port: Box<dyn SerialPort>,
}

impl StatusStream for ElmoStatusStream {
    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}
