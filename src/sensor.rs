use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use rand::Rng;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::SensorConfig;

/// Mock temperature sensor - uniform readings over the configured range
pub struct TemperatureSensor {
    config: SensorConfig,
    readings: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub temperature: f64,
    pub timestamp: i64,
    pub sensor_id: String,
    pub status: &'static str,
}

impl TemperatureSensor {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            config: config.clone(),
            readings: AtomicU64::new(0),
        }
    }

    pub fn read(&self) -> SensorReading {
        let raw = rand::thread_rng().gen_range(self.config.min_celsius..self.config.max_celsius);
        self.readings.fetch_add(1, Ordering::Relaxed);
        SensorReading {
            temperature: (raw * 100.0).round() / 100.0,
            timestamp: chrono::Utc::now().timestamp(),
            sensor_id: self.config.sensor_id.clone(),
            status: "active",
        }
    }

    pub fn readings(&self) -> u64 {
        self.readings.load(Ordering::Relaxed)
    }
}

pub fn build_router(sensor: Arc<TemperatureSensor>) -> Router {
    Router::new()
        .route("/sensor", get(sensor_reading))
        .route("/health", get(sensor_health))
        .layer(CorsLayer::permissive())
        .with_state(sensor)
}

/// Serve the sensor on its own listener
pub async fn run(sensor: Arc<TemperatureSensor>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", sensor.config.address, sensor.config.port);
    let app = build_router(sensor);

    info!("🌡️ Temperature sensor listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn sensor_reading(State(sensor): State<Arc<TemperatureSensor>>) -> Json<SensorReading> {
    Json(sensor.read())
}

async fn sensor_health(State(sensor): State<Arc<TemperatureSensor>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "temperature-sensor",
        "readings": sensor.readings(),
    }))
}
