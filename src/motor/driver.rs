// High-level driver for the two-wheeled base
//
// Runs the init/kill sequences across both motor channels and applies
// wheel commands to the correct side.

use std::fmt;

use tracing::{debug, error, info, warn};

use super::channel::{ChannelError, MotorChannel, WheelSide};
use super::kinematics::WheelCommand;

/// A single step of the init or kill sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stop,
    SetMode,
    ZeroEncoder,
    Enable,
    Disable,
    SetVelocity,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Stop => "stop",
            Step::SetMode => "set mode",
            Step::ZeroEncoder => "zero encoder",
            Step::Enable => "enable",
            Step::Disable => "disable",
            Step::SetVelocity => "set velocity",
        };
        f.write_str(name)
    }
}

/// A failed sequence step on one channel
#[derive(Debug)]
pub struct StepFailure {
    pub side: WheelSide,
    pub step: Step,
    pub source: ChannelError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.side, self.step, self.source)
    }
}

fn join(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Motors failed to initialize ({})", join(.failures))]
    Initialization { failures: Vec<StepFailure> },

    #[error("Motors failed to stop ({})", join(.failures))]
    Kill { failures: Vec<StepFailure> },

    #[error("Motors failed to set velocity ({})", join(.failures))]
    Velocity { failures: Vec<StepFailure> },
}

/// The two motor channels of the base
///
/// Sequences visit the channels in the order they were given.
pub struct DrivePair<C: MotorChannel> {
    channels: [(WheelSide, C); 2],
    mode: i32,
}

impl<C: MotorChannel> DrivePair<C> {
    /// `first` and `second` must drive opposite wheels
    pub fn new(first: (WheelSide, C), second: (WheelSide, C), mode: i32) -> Self {
        debug_assert_ne!(first.0, second.0, "both channels assigned to one wheel");
        Self {
            channels: [first, second],
            mode,
        }
    }

    /// Stop, set mode, zero the encoder and energize each motor
    ///
    /// Every step is attempted on every channel even after a failure, so the
    /// hardware is at least driven toward a known configuration. Any failure
    /// fails the whole sequence.
    pub fn init_motors(&mut self) -> Result<(), DriveError> {
        info!("Initializing motors (mode {})", self.mode);
        let mode = self.mode;
        let mut failures = Vec::new();

        for (side, channel) in self.channels.iter_mut() {
            let steps = [
                (Step::Stop, channel.stop_motor()),
                (Step::SetMode, channel.set_mode(mode)),
                (Step::ZeroEncoder, channel.set_encoder(0)),
                (Step::Enable, channel.toggle_motor(true)),
            ];
            collect_failures(*side, channel.name(), steps, &mut failures);
        }

        if failures.is_empty() {
            info!("Motors initialized successfully");
            Ok(())
        } else {
            error!("Motors failed to initialize!");
            Err(DriveError::Initialization { failures })
        }
    }

    /// Stop and de-energize both motors
    ///
    /// Always applied to both channels; safe to repeat on stopped motors.
    pub fn kill_motors(&mut self) -> Result<(), DriveError> {
        info!("Killing motors");
        let mut failures = Vec::new();

        for (side, channel) in self.channels.iter_mut() {
            let steps = [
                (Step::Stop, channel.stop_motor()),
                (Step::Disable, channel.toggle_motor(false)),
            ];
            collect_failures(*side, channel.name(), steps, &mut failures);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DriveError::Kill { failures })
        }
    }

    /// Send a wheel command to both channels
    ///
    /// Both wheels are always written, even if the first write fails.
    pub fn set_velocity(&mut self, wheels: WheelCommand) -> Result<(), DriveError> {
        debug!(
            "Setting wheel velocities: left={:.1}, right={:.1}",
            wheels.left, wheels.right
        );
        let mut failures = Vec::new();

        for (side, channel) in self.channels.iter_mut() {
            let value = match side {
                WheelSide::Left => wheels.left,
                WheelSide::Right => wheels.right,
            };
            if let Err(source) = channel.set_velocity(value) {
                failures.push(StepFailure {
                    side: *side,
                    step: Step::SetVelocity,
                    source,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DriveError::Velocity { failures })
        }
    }
}

fn collect_failures<const N: usize>(
    side: WheelSide,
    name: &str,
    steps: [(Step, Result<(), ChannelError>); N],
    failures: &mut Vec<StepFailure>,
) {
    for (step, result) in steps {
        if let Err(source) = result {
            warn!("{} motor ({}) failed to {}: {}", side, name, step, source);
            failures.push(StepFailure { side, step, source });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::{MotorCall, Operation, SimChannel};

    fn pair() -> (DrivePair<SimChannel>, SimChannel, SimChannel) {
        let right = SimChannel::new("right");
        let left = SimChannel::new("left");
        let drive = DrivePair::new(
            (WheelSide::Right, right.clone()),
            (WheelSide::Left, left.clone()),
            5,
        );
        (drive, right, left)
    }

    #[test]
    fn test_init_sequence_order() {
        let (mut drive, right, left) = pair();
        drive.init_motors().unwrap();

        let expected = vec![
            MotorCall::Stop,
            MotorCall::SetMode(5),
            MotorCall::SetEncoder(0),
            MotorCall::Toggle(true),
        ];
        assert_eq!(right.calls(), expected);
        assert_eq!(left.calls(), expected);
        assert!(right.is_energized() && left.is_energized());
    }

    #[test]
    fn test_init_failure_on_second_channel_attempts_every_step() {
        let (mut drive, right, left) = pair();
        left.fail(Operation::SetEncoder);

        let err = drive.init_motors().unwrap_err();
        match err {
            DriveError::Initialization { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].side, WheelSide::Left);
                assert_eq!(failures[0].step, Step::ZeroEncoder);
            }
            other => panic!("unexpected error: {}", other),
        }
        // No early abort: the enable step still ran after the failure
        assert_eq!(right.calls().len(), 4);
        assert_eq!(left.calls().len(), 4);
        assert_eq!(left.count(Operation::Toggle), 1);
    }

    #[test]
    fn test_init_failure_on_first_channel_still_initializes_second() {
        let (mut drive, right, left) = pair();
        right.fail(Operation::Stop);

        assert!(drive.init_motors().is_err());
        assert_eq!(left.calls().len(), 4);
    }

    #[test]
    fn test_kill_sequence_is_stop_then_disable_on_both() {
        let (mut drive, right, left) = pair();
        drive.init_motors().unwrap();
        right.clear_calls();
        left.clear_calls();

        drive.kill_motors().unwrap();
        let expected = vec![MotorCall::Stop, MotorCall::Toggle(false)];
        assert_eq!(right.calls(), expected);
        assert_eq!(left.calls(), expected);
        assert!(!right.is_energized() && !left.is_energized());
    }

    #[test]
    fn test_kill_twice_is_harmless() {
        let (mut drive, right, _left) = pair();
        assert!(drive.kill_motors().is_ok());
        assert!(drive.kill_motors().is_ok());
        assert_eq!(right.count(Operation::Stop), 2);
    }

    #[test]
    fn test_kill_reports_failure_but_visits_every_channel() {
        let (mut drive, right, left) = pair();
        right.fail(Operation::Toggle);
        assert!(matches!(drive.kill_motors(), Err(DriveError::Kill { .. })));
        assert_eq!(left.calls(), vec![MotorCall::Stop, MotorCall::Toggle(false)]);
    }

    #[test]
    fn test_set_velocity_routes_by_side() {
        let (mut drive, right, left) = pair();
        drive.set_velocity(WheelCommand::new(-100.0, 250.0)).unwrap();
        assert_eq!(left.velocity(), -100.0);
        assert_eq!(right.velocity(), 250.0);
    }

    #[test]
    fn test_set_velocity_failure_still_writes_other_wheel() {
        let (mut drive, right, left) = pair();
        right.fail(Operation::SetVelocity);
        assert!(drive.set_velocity(WheelCommand::new(10.0, 10.0)).is_err());
        assert_eq!(left.velocity(), 10.0);
    }
}
