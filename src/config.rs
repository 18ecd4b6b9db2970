// Timeouts, topics, motor configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::DriveGeometry;
use crate::motor::WheelSide;

// Deadman's switch: motors are killed if no command arrives within this window
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(2);

// Placeholder encoder telemetry period
pub const ENCODER_POLL_PERIOD: Duration = Duration::from_secs(1);

// Zenoh topics
pub const TOPIC_MOTION: &str = "robot/cmd/motion"; // velocity commands
pub const TOPIC_DRIVE_STATUS: &str = "robot/state/drive"; // health + applied wheel command

// Robot geometry
pub const ENCODER_RESOLUTION: f64 = 2000.0; // ticks per motor revolution
pub const GEAR_RATIO: f64 = 20.0;
pub const WHEEL_RADIUS: f64 = 0.1524; // meters
pub const ROBOT_RADIUS: f64 = 0.29; // meters
pub const TOP_SPEED: f64 = 2.0; // m/s

// The left motor is mounted mirrored
pub const LEFT_MOTOR_WARP: f64 = -1.0;
pub const RIGHT_MOTOR_WARP: f64 = 1.0;

// Controller operating mode used for velocity control
pub const MOTOR_MODE: i32 = 5;

// Serial ports for the motor controllers
pub const RIGHT_MOTOR_PORT: &str = "/dev/ttyUSB0";
pub const LEFT_MOTOR_PORT: &str = "/dev/ttyUSB1";

// Bytes requested per blocking status read
pub const STATUS_READ_LEN: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One motor controller and the wheel it drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub port: String,
    pub side: WheelSide,
}

/// Startup configuration, immutable once the runtime is running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub watchdog_timeout_ms: u64,
    pub encoder_poll_ms: u64,
    pub motion_topic: String,
    pub status_topic: String,
    pub motor_mode: i32,
    pub geometry: DriveGeometry,
    /// Initialization and kill sequences visit channels in this order
    pub channels: Vec<ChannelConfig>,
    /// Use in-memory motor channels instead of serial hardware
    pub simulate: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: WATCHDOG_TIMEOUT.as_millis() as u64,
            encoder_poll_ms: ENCODER_POLL_PERIOD.as_millis() as u64,
            motion_topic: TOPIC_MOTION.to_string(),
            status_topic: TOPIC_DRIVE_STATUS.to_string(),
            motor_mode: MOTOR_MODE,
            geometry: DriveGeometry::default(),
            channels: vec![
                ChannelConfig {
                    port: RIGHT_MOTOR_PORT.to_string(),
                    side: WheelSide::Right,
                },
                ChannelConfig {
                    port: LEFT_MOTOR_PORT.to_string(),
                    side: WheelSide::Left,
                },
            ],
            simulate: false,
        }
    }
}

impl RuntimeConfig {
    /// Load a JSON config file; missing fields fall back to the defaults above
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn encoder_poll_period(&self) -> Duration {
        Duration::from_millis(self.encoder_poll_ms)
    }

    /// Replace the port of the channel assigned to `side`
    pub fn set_port(&mut self, side: WheelSide, port: String) {
        for channel in self.channels.iter_mut().filter(|c| c.side == side) {
            channel.port = port.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "watchdog_timeout_ms must be non-zero".into(),
            ));
        }
        if self.encoder_poll_ms == 0 {
            return Err(ConfigError::Invalid("encoder_poll_ms must be non-zero".into()));
        }

        let g = &self.geometry;
        let positive = [
            ("encoder_resolution", g.encoder_resolution),
            ("gear_ratio", g.gear_ratio),
            ("wheel_radius", g.wheel_radius),
            ("robot_radius", g.robot_radius),
            ("top_speed", g.top_speed),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be strictly positive, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [("left_warp", g.left_warp), ("right_warp", g.right_warp)] {
            if !value.is_finite() || value == 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be finite and non-zero, got {}",
                    name, value
                )));
            }
        }

        let lefts = self.channels.iter().filter(|c| c.side == WheelSide::Left).count();
        let rights = self.channels.iter().filter(|c| c.side == WheelSide::Right).count();
        if self.channels.len() != 2 || lefts != 1 || rights != 1 {
            return Err(ConfigError::Invalid(
                "exactly one left and one right motor channel are required".into(),
            ));
        }

        Ok(())
    }
}
