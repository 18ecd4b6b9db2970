// Process wiring: zenoh session, motor channels and the supervised tasks
//
// Tasks: supervisor (1), fault monitor per channel (2, blocking threads),
// encoder poller (1), command receiver (1), status publisher (1).
// All of them stop at their next blocking boundary once Ctrl-C triggers
// the shutdown signal.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::encoder::run_encoder_poller;
use crate::messages::DriveStatus;
use crate::monitor::FaultMonitor;
use crate::motor::{DriveError, DrivePair, ElmoChannel, MotorChannel, SimChannel, WheelSide};
use crate::receiver::CommandReceiver;
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::state::SharedState;
use crate::supervisor::Supervisor;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Expected exactly 2 motor channels, got {0}")]
    ChannelCount(usize),

    #[error("Startup initialization failed, motors need troubleshooting: {0}")]
    StartupInit(#[from] DriveError),

    #[error("Supervisor exited unexpectedly")]
    SupervisorExited,
}

pub async fn run(config: RuntimeConfig) -> Result<(), BoxError> {
    config.validate()?;

    if config.simulate {
        info!("Simulation mode: using in-memory motor channels");
        let channels = config
            .channels
            .iter()
            .map(|c| (c.side, SimChannel::new(c.port.clone())))
            .collect();
        run_with_channels(config, channels).await
    } else {
        let mut channels = Vec::with_capacity(config.channels.len());
        for c in &config.channels {
            info!("Opening {} motor controller on {}", c.side, c.port);
            channels.push((c.side, ElmoChannel::open(&c.port)?));
        }
        run_with_channels(config, channels).await
    }
}

pub async fn run_with_channels<C>(
    config: RuntimeConfig,
    channels: Vec<(WheelSide, C)>,
) -> Result<(), BoxError>
where
    C: MotorChannel + 'static,
{
    let state = Arc::new(SharedState::new());
    let signal = ShutdownSignal::new();

    // Read handles are taken before the write side moves into the supervisor
    let mut streams = Vec::with_capacity(channels.len());
    for (side, channel) in &channels {
        streams.push((format!("{} ({})", channel.name(), side), channel.status_stream()?));
    }

    let count = channels.len();
    let mut channels = channels.into_iter();
    let (Some(first), Some(second), None) = (channels.next(), channels.next(), channels.next())
    else {
        return Err(RuntimeError::ChannelCount(count).into());
    };

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session
        .declare_subscriber(config.motion_topic.clone())
        .await?;
    let pub_status = session
        .declare_publisher(config.status_topic.clone())
        .await?;

    let drive = DrivePair::new(first, second, config.motor_mode);
    let mut supervisor = Supervisor::new(
        drive,
        config.geometry,
        state.clone(),
        config.watchdog_timeout(),
    );
    // Bail out: a failure here needs troubleshooting, not retries
    supervisor.startup().map_err(RuntimeError::StartupInit)?;

    let mut tasks = JoinSet::new();
    for (name, stream) in streams {
        let monitor = FaultMonitor::new(name, stream, state.clone(), signal.subscribe());
        tasks.spawn_blocking(move || monitor.run());
    }
    tasks.spawn(run_encoder_poller(
        config.encoder_poll_period(),
        signal.subscribe(),
    ));
    tasks.spawn(CommandReceiver::new(state.clone()).run(subscriber, signal.subscribe()));
    tasks.spawn(publish_status(
        pub_status,
        supervisor.subscribe(),
        signal.subscribe(),
    ));

    info!(
        "Runtime started: {}ms watchdog timeout, top speed {} m/s",
        config.watchdog_timeout_ms, config.geometry.top_speed
    );
    info!("Subscribed to: {}", config.motion_topic);
    info!("Publishing to: {}", config.status_topic);

    let mut supervisor_task = tokio::spawn(supervisor.run(signal.subscribe()));

    let result = tokio::select! {
        ctrl_c = tokio::signal::ctrl_c() => {
            info!("Ctrl-C detected, shutting down...");
            ctrl_c.map_err(BoxError::from)
        }
        _ = &mut supervisor_task => {
            error!("Supervisor exited before shutdown");
            Err(RuntimeError::SupervisorExited.into())
        }
    };

    signal.trigger();
    if !supervisor_task.is_finished() {
        if let Err(e) = supervisor_task.await {
            error!("Supervisor task failed: {}", e);
        }
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Task failed during shutdown: {}", e);
        }
    }

    session.close().await?;
    info!("Runtime stopped");
    result
}

/// Forward every supervisor status to zenoh as JSON
async fn publish_status(
    publisher: zenoh::pubsub::Publisher<'static>,
    mut status: watch::Receiver<DriveStatus>,
    mut shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match serde_json::to_string(&current) {
                    Ok(json) => {
                        if let Err(e) = publisher.put(json).await {
                            warn!("Failed to publish drive status: {}", e);
                        }
                    }
                    Err(e) => warn!("Failed to encode drive status: {}", e),
                }
            }
        }
    }
}
