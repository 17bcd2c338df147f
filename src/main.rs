use anyhow::Result;
use keba_control::config::Config;
use keba_control::controller::ChargeController;
use keba_control::logging::{get_logger, init_logging};
use keba_control::persistence::JsonFileStore;
use keba_control::transport::LogTransport;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let logger = get_logger("main");
    logger.info(&format!(
        "keba-control {} starting up with {} station(s)",
        env!("APP_VERSION"),
        config.stations.len()
    ));

    let store = Arc::new(JsonFileStore::new(&config.persistence.failsafe_file));
    // No hardware link is wired in the binary yet; commands are logged only
    let transport = Arc::new(LogTransport::new());
    let controller = Arc::new(
        ChargeController::from_config(&config, transport, store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start stations: {}", e))?,
    );

    let result = run(Arc::clone(&controller), &config).await;

    controller.shutdown().await;
    logger.info("Shutdown complete");
    result
}

#[cfg(feature = "web")]
async fn run(controller: Arc<ChargeController>, config: &Config) -> Result<()> {
    tokio::select! {
        served = keba_control::web::serve(controller, &config.web.host, config.web.port) => served,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            Ok(())
        }
    }
}

#[cfg(not(feature = "web"))]
async fn run(_controller: Arc<ChargeController>, _config: &Config) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
