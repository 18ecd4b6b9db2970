// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::motor::WheelCommand;

// Command from teleop/planner -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// m/s, positive = forward
    pub linear: f64,
    /// rad/s, positive = counter-clockwise
    pub angular: f64,
}

impl VelocityCommand {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    /// Watchdog tripped: no command within the timeout
    #[default]
    CmdStale,
    /// Motors could not be (re)initialized
    MotorsDisabled,
}

// Status from runtime -> observers, published after each supervisor cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveStatus {
    pub health: RuntimeHealth,
    pub motors_enabled: bool,
    /// Last wheel command applied, zero while disabled
    pub wheels: WheelCommand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let cmd: VelocityCommand = serde_json::from_str(r#"{"linear": 0.5, "angular": -0.25}"#).unwrap();
        assert_eq!(cmd, VelocityCommand::new(0.5, -0.25));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        assert!(serde_json::from_str::<VelocityCommand>(r#"{"linear": 0.5}"#).is_err());
    }

    #[test]
    fn test_status_json_shape() {
        let status = DriveStatus {
            health: RuntimeHealth::MotorsDisabled,
            motors_enabled: false,
            wheels: WheelCommand::zero(),
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["health"], "motors_disabled");
        assert_eq!(json["motors_enabled"], false);
        assert_eq!(json["wheels"]["left"], 0.0);
    }
}
