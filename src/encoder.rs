// Periodic encoder telemetry task
//
// Nothing is requested from the controllers yet; the task only keeps its
// slot in the schedule until odometry is wired in.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, trace};

use crate::shutdown::Shutdown;

pub async fn run_encoder_poller(period: Duration, mut shutdown: Shutdown) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Encoder poller started ({}ms period)", period.as_millis());

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tick.tick() => trace!("Encoder poll tick"),
        }
    }
    info!("Encoder poller stopped");
}
