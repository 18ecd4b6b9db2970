use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use diffdrive_zenoh_runtime::config::RuntimeConfig;
use diffdrive_zenoh_runtime::motor::WheelSide;

/// Watchdog-supervised drive runtime for the two-wheeled base
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON config file; built-in defaults are used for missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drive in-memory motor channels instead of the serial controllers
    #[arg(long)]
    simulate: bool,

    /// Override the watchdog timeout (milliseconds)
    #[arg(long)]
    watchdog_ms: Option<u64>,

    /// Override the left motor controller's serial port
    #[arg(long)]
    left_port: Option<String>,

    /// Override the right motor controller's serial port
    #[arg(long)]
    right_port: Option<String>,
}

fn load_config(args: Args) -> Result<RuntimeConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            RuntimeConfig::load(path)?
        }
        None => RuntimeConfig::default(),
    };

    config.simulate |= args.simulate;
    if let Some(ms) = args.watchdog_ms {
        config.watchdog_timeout_ms = ms;
    }
    if let Some(port) = args.left_port {
        config.set_port(WheelSide::Left, port);
    }
    if let Some(port) = args.right_port {
        config.set_port(WheelSide::Right, port);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match load_config(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = diffdrive_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
