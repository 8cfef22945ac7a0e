mod config;
mod error;
mod imaging;
mod metrics;
mod model;
mod scorer;
mod sensor;
mod web;

use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::sensor::TemperatureSensor;
use crate::web::server::{AppState, WebServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "produce_oracle=info".into()),
        )
        .init();

    info!("🌾 produce-oracle v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "produce-oracle.toml".to_string());

    let config = Config::load(&config_path)?;
    info!("Config loaded from {}", config_path);

    let config = Arc::new(config);

    // Classifier, scorer, fetcher and counters
    let state = AppState::new(config.clone())?;
    info!("📁 Model file: {}", config.model.path);

    // Start temperature sensor on its own listener
    if config.sensor.enabled {
        let sensor = Arc::new(TemperatureSensor::new(&config.sensor));
        tokio::spawn(async move {
            if let Err(e) = sensor::run(sensor).await {
                error!("Sensor server error: {}", e);
            }
        });
    } else {
        info!("Temperature sensor disabled");
    }

    WebServer::new(state).run().await
}
