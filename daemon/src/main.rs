use anyhow::{Context, Result};
use nightmother_daemon::{
    agent::Agent,
    collector::LinuxProcessCollector,
    config::Config,
    db::Database,
    detector::CpuThresholdDetector,
    logging,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    println!("Starting NightMother...");

    let config_path = Config::config_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let check_interval = config.check_interval()?;

    let _log_guard = logging::init(&config.logging.file).context("failed to set up logging")?;

    let store = Database::open(&config.database.path).context("failed to open event store")?;
    let collector = LinuxProcessCollector::new(config.sample_window());
    let detector = CpuThresholdDetector::new(config.detection.cpu_threshold_percent);

    let cancel = CancellationToken::new();
    let mut agent = Agent::new(collector, detector, store, check_interval, cancel.clone());
    info!("NightMother initialized");

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received");
                cancel.cancel();
            }
            Err(e) => warn!("Cannot listen for interrupt: {}", e),
        }
    });

    agent.start().await?;
    Ok(())
}
