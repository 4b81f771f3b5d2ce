use std::sync::Arc;

use candlewatch::{
    alert::TracingAlertSink,
    config::AppConfig,
    logger::init_tracing,
    market::client::BinanceClient,
    scheduler::tick::TickScheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting candlewatch...");

    let cfg = AppConfig::from_env();

    let client = Arc::new(BinanceClient::new(
        cfg.api_base_url.clone(),
        cfg.request_timeout,
        cfg.stable_marker.clone(),
    )?);
    let scheduler = TickScheduler::new(client, TracingAlertSink, cfg);

    tokio::select! {
        result = scheduler.run() => {
            // run() only returns on a fatal startup error.
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
