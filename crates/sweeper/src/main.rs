//! Sweeper binary that periodically deletes expired records.

use std::io;

use vanish_domain::config::SweeperConfig;
use vanish_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use vanish_storage::SeaOrmStorage;
use vanish_sweeper::{run_sweeper, SweeperError};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[sweeper] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), SweeperError> {
    let config = SweeperConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("SWEEPER");
    init_telemetry(&telemetry_config)?;
    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    run_sweeper(config.interval(), &storage).await
}
