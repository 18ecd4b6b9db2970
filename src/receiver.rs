// Command receiver: inbound velocity commands -> shared state

use std::sync::Arc;

use tracing::{debug, info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use crate::messages::VelocityCommand;
use crate::shutdown::Shutdown;
use crate::state::SharedState;

pub type CommandSubscriber = Subscriber<FifoChannelHandler<Sample>>;

pub struct CommandReceiver {
    state: Arc<SharedState>,
}

impl CommandReceiver {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    /// Latest wins: an unconsumed earlier command is silently replaced
    pub fn on_command(&self, cmd: VelocityCommand) {
        debug!("Received command: {:?}", cmd);
        self.state.record_command(cmd);
    }

    /// Decode a JSON payload and record it; bad payloads are dropped
    pub fn on_payload(&self, payload: &[u8]) {
        match serde_json::from_slice::<VelocityCommand>(payload) {
            Ok(cmd) => self.on_command(cmd),
            Err(e) => warn!("Failed to parse command: {}", e),
        }
    }

    /// Forward samples from a zenoh subscriber until shutdown
    pub async fn run(self, subscriber: CommandSubscriber, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                sample = subscriber.recv_async() => match sample {
                    Ok(sample) => self.on_payload(&sample.payload().to_bytes()),
                    Err(e) => {
                        warn!("Command subscriber closed: {}", e);
                        break;
                    }
                },
            }
        }
        info!("Command receiver stopped");
    }
}
