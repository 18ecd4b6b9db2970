// Watchdog supervisor: the control loop
// If the command source goes quiet, the wheels are stopped and the motors
// switched off until the next command arrives.
//
// Every cycle needs its own fresh command. Nothing carries over between
// cycles, so the robot never moves for longer than one timeout without a
// live command.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::messages::{DriveStatus, RuntimeHealth};
use crate::motor::{
    translate, DriveError, DriveGeometry, DrivePair, MotorChannel, WheelCommand,
};
use crate::shutdown::Shutdown;
use crate::state::SharedState;

/// What a single supervisor cycle did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// A fresh command was translated and sent to both wheels
    Applied(WheelCommand),
    /// A fresh command was translated but at least one wheel refused it.
    /// The motors stay enabled.
    VelocityFailed(WheelCommand),
    /// Motors were disabled and re-initialization failed; nothing was sent
    InitFailed,
    /// No command within the timeout; motors were killed
    WatchdogTripped,
}

impl CycleOutcome {
    pub fn health(&self) -> RuntimeHealth {
        match self {
            CycleOutcome::Applied(_) | CycleOutcome::VelocityFailed(_) => RuntimeHealth::Ok,
            CycleOutcome::InitFailed => RuntimeHealth::MotorsDisabled,
            CycleOutcome::WatchdogTripped => RuntimeHealth::CmdStale,
        }
    }
}

pub struct Supervisor<C: MotorChannel> {
    drive: DrivePair<C>,
    geometry: DriveGeometry,
    state: Arc<SharedState>,
    watchdog_timeout: Duration,
    status: watch::Sender<DriveStatus>,
}

impl<C: MotorChannel> Supervisor<C> {
    pub fn new(
        drive: DrivePair<C>,
        geometry: DriveGeometry,
        state: Arc<SharedState>,
        watchdog_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(DriveStatus::default());
        Self {
            drive,
            geometry,
            state,
            watchdog_timeout,
            status,
        }
    }

    /// Observe the status published after every cycle (including repeats)
    pub fn subscribe(&self) -> watch::Receiver<DriveStatus> {
        self.status.subscribe()
    }

    /// First initialization at startup. The caller decides whether failure
    /// is fatal.
    pub fn startup(&mut self) -> Result<(), DriveError> {
        let result = self.drive.init_motors();
        self.state.set_motors_enabled(result.is_ok());
        result
    }

    /// One watchdog cycle
    ///
    /// The fresh flag is cleared on entry, so a command that lands while the
    /// previous cycle was still processing is not counted here. With a command
    /// period close to the timeout this can trip the watchdog spuriously.
    pub async fn cycle(&mut self) -> CycleOutcome {
        self.state.clear_fresh();

        // The only suspension point of the loop
        if !self.state.wait_for_command(self.watchdog_timeout).await {
            warn!(
                "Watchdog timed out! No command for {}ms",
                self.watchdog_timeout.as_millis()
            );
            if let Err(e) = self.drive.kill_motors() {
                error!("{}", e);
            }
            self.state.set_motors_enabled(false);
            return CycleOutcome::WatchdogTripped;
        }

        if !self.state.motors_enabled() {
            info!("Command received while disabled, re-initializing motors");
            match self.drive.init_motors() {
                Ok(()) => self.state.set_motors_enabled(true),
                Err(e) => {
                    error!("{}", e);
                    self.state.set_motors_enabled(false);
                    return CycleOutcome::InitFailed;
                }
            }
        }

        let cmd = self.state.latest_command();
        debug!("linear {:.3} angular {:.3}", cmd.linear, cmd.angular);
        let wheels = translate(cmd.linear, cmd.angular, &self.geometry);

        // A one-wheel failure is logged only; the watchdog and the fault
        // monitors are the sole paths that disable the motors.
        match self.drive.set_velocity(wheels) {
            Ok(()) => CycleOutcome::Applied(wheels),
            Err(e) => {
                error!("{}", e);
                CycleOutcome::VelocityFailed(wheels)
            }
        }
    }

    /// Run cycles until shutdown, then kill the motors
    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!(
            "Supervisor started: {}ms watchdog timeout",
            self.watchdog_timeout.as_millis()
        );

        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                outcome = self.cycle() => outcome,
            };
            self.publish(outcome);
        }

        info!("Supervisor shutting down, stopping motors");
        if let Err(e) = self.drive.kill_motors() {
            error!("{}", e);
        }
        self.state.set_motors_enabled(false);
    }

    fn publish(&self, outcome: CycleOutcome) {
        let wheels = match outcome {
            CycleOutcome::Applied(wheels) | CycleOutcome::VelocityFailed(wheels) => wheels,
            CycleOutcome::InitFailed | CycleOutcome::WatchdogTripped => WheelCommand::zero(),
        };
        let status = DriveStatus {
            health: outcome.health(),
            motors_enabled: self.state.motors_enabled(),
            wheels,
        };
        self.status.send_replace(status);
    }
}
