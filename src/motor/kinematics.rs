// Differential-drive kinematics for the two-wheeled base
// Converts commanded (linear, angular) velocity into per-wheel encoder tick rates.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{
    ENCODER_RESOLUTION, GEAR_RATIO, LEFT_MOTOR_WARP, RIGHT_MOTOR_WARP, ROBOT_RADIUS, TOP_SPEED,
    WHEEL_RADIUS,
};

/// Robot geometry and motor calibration used by [`translate`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveGeometry {
    /// Encoder ticks per motor revolution
    pub encoder_resolution: f64,
    /// Motor revolutions per wheel revolution
    pub gear_ratio: f64,
    /// meters
    pub wheel_radius: f64,
    /// meters (distance from the center of rotation to each wheel)
    pub robot_radius: f64,
    /// Sign/scale correction for the left wheel's mounting orientation
    pub left_warp: f64,
    /// Sign/scale correction for the right wheel's mounting orientation
    pub right_warp: f64,
    /// Maximum accepted |linear| in m/s
    pub top_speed: f64,
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            encoder_resolution: ENCODER_RESOLUTION,
            gear_ratio: GEAR_RATIO,
            wheel_radius: WHEEL_RADIUS,
            robot_radius: ROBOT_RADIUS,
            left_warp: LEFT_MOTOR_WARP,
            right_warp: RIGHT_MOTOR_WARP,
            top_speed: TOP_SPEED,
        }
    }
}

impl DriveGeometry {
    /// Conversion from wheel surface speed (m/s) to encoder ticks per second
    pub fn meters_per_second_to_ticks(&self) -> f64 {
        self.encoder_resolution * self.gear_ratio / (2.0 * self.wheel_radius * PI)
    }

    /// Tick-rate difference between the wheels per rad/s of rotation
    pub fn turn_offset(&self) -> f64 {
        self.meters_per_second_to_ticks() * self.robot_radius
    }
}

/// Target tick rates for the two wheels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelCommand {
    pub left: f64,
    pub right: f64,
}

impl WheelCommand {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Convert a commanded body velocity into wheel tick rates
///
/// # Arguments
/// * `linear` - Forward velocity in m/s (positive = forward)
/// * `angular` - Rotational velocity in rad/s (positive = counter-clockwise)
///
/// A linear speed above `geometry.top_speed` is not scaled down: the whole
/// command (turn included) becomes a full stop for this cycle.
/// The individual wheel outputs are not clamped.
pub fn translate(linear: f64, angular: f64, geometry: &DriveGeometry) -> WheelCommand {
    let (linear, angular) = if linear.abs() > geometry.top_speed {
        warn!(
            "Commanded linear speed {:.3} m/s exceeds top speed {:.3} m/s, stopping",
            linear, geometry.top_speed
        );
        (0.0, 0.0)
    } else {
        (linear, angular)
    };

    let mps2tps = geometry.meters_per_second_to_ticks();
    let turn_offset = geometry.turn_offset();

    WheelCommand {
        left: (linear * mps2tps - turn_offset * angular) * geometry.left_warp,
        right: (linear * mps2tps + turn_offset * angular) * geometry.right_warp,
    }
}
