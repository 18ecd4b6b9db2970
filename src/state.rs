//! State shared between the supervisor, the command receiver and the fault
//! monitors.
//!
//! Every field is an independent atomic. A reader may see `linear` and
//! `angular` from two different commands if they race a write; at the
//! control rate that is an accepted approximation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::messages::VelocityCommand;

#[derive(Debug, Default)]
pub struct SharedState {
    linear: AtomicU64,
    angular: AtomicU64,
    fresh: AtomicBool,
    enabled: AtomicBool,
    arrived: Notify,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest command and mark it fresh. Older unconsumed commands
    /// are overwritten.
    pub fn record_command(&self, cmd: VelocityCommand) {
        self.linear.store(cmd.linear.to_bits(), Ordering::Release);
        self.angular.store(cmd.angular.to_bits(), Ordering::Release);
        self.fresh.store(true, Ordering::Release);
        self.arrived.notify_one();
    }

    pub fn latest_command(&self) -> VelocityCommand {
        VelocityCommand {
            linear: f64::from_bits(self.linear.load(Ordering::Acquire)),
            angular: f64::from_bits(self.angular.load(Ordering::Acquire)),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh.load(Ordering::Acquire)
    }

    pub fn clear_fresh(&self) {
        self.fresh.store(false, Ordering::Release);
    }

    /// Wait until a command is marked fresh or `timeout` elapses.
    ///
    /// Returns whether a fresh command is present.
    pub async fn wait_for_command(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // notify_one leaves a permit, so a command landing between the
            // check and the await is not lost
            let notified = self.arrived.notified();
            if self.is_fresh() {
                return true;
            }
            // A stored permit from an already-consumed command wakes us
            // early; the loop re-checks the flag.
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_fresh();
            }
        }
    }

    pub fn motors_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Supervisor only
    pub fn set_motors_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Request an emergency disable; returns whether motors were enabled
    pub fn disable_motors(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_stale_and_disabled() {
        let state = SharedState::new();
        assert!(!state.is_fresh());
        assert!(!state.motors_enabled());
        assert_eq!(state.latest_command(), VelocityCommand::default());
    }

    #[test]
    fn test_latest_command_wins() {
        let state = SharedState::new();
        state.record_command(VelocityCommand::new(0.5, 0.1));
        state.record_command(VelocityCommand::new(-0.2, 1.5));
        assert!(state.is_fresh());
        assert_eq!(state.latest_command(), VelocityCommand::new(-0.2, 1.5));

        state.clear_fresh();
        assert!(!state.is_fresh());
        // Clearing freshness keeps the last values
        assert_eq!(state.latest_command(), VelocityCommand::new(-0.2, 1.5));
    }

    #[test]
    fn test_disable_reports_previous_state() {
        let state = SharedState::new();
        state.set_motors_enabled(true);
        assert!(state.disable_motors());
        assert!(!state.disable_motors());
        assert!(!state.motors_enabled());
    }

    #[tokio::test]
    async fn test_wait_times_out_without_command() {
        let state = SharedState::new();
        let start = Instant::now();
        assert!(!state.wait_for_command(Duration::from_millis(30)).await);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_fresh() {
        let state = SharedState::new();
        state.record_command(VelocityCommand::new(1.0, 0.0));
        assert!(state.wait_for_command(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_command() {
        let state = Arc::new(SharedState::new());
        let writer = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.record_command(VelocityCommand::new(0.3, 0.0));
        });

        let start = Instant::now();
        assert!(state.wait_for_command(Duration::from_secs(5)).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stale_permit_does_not_count_as_command() {
        let state = SharedState::new();
        // Leaves a notify permit behind
        state.record_command(VelocityCommand::new(0.3, 0.0));
        state.clear_fresh();
        assert!(!state.wait_for_command(Duration::from_millis(30)).await);
    }
}
