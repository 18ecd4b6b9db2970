// Motor control module for the differential-drive base
//
// Provides:
// - Differential-drive kinematics (body velocity -> wheel velocities)
// - The motor channel contract and its Elmo serial implementation
// - An in-memory channel for simulation and tests
// - Init/kill/velocity sequences across both wheels

mod channel;
mod driver;
pub mod elmo;
pub mod kinematics;
pub mod sim;

pub use channel::{ChannelError, MotorChannel, StatusStream, WheelSide};
pub use driver::{DriveError, DrivePair, Step, StepFailure};
pub use elmo::ElmoChannel;
pub use kinematics::{translate, DriveGeometry, WheelCommand};
pub use sim::SimChannel;
