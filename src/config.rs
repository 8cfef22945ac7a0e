use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListenConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_oracle_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Path to the trained classifier weights
    #[serde(default = "default_model_path")]
    pub path: String,
    /// Version tag reported in prediction responses
    #[serde(default = "default_model_version")]
    pub version: String,
    #[serde(default = "default_input_dim")]
    pub input_width: u32,
    #[serde(default = "default_input_dim")]
    pub input_height: u32,
    /// Fixed seed for the heuristic fallback (entropy-seeded when unset)
    pub fallback_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Downloads larger than this are rejected
    #[serde(default = "default_max_image_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_sensor_port")]
    pub port: u16,
    #[serde(default = "default_sensor_id")]
    pub sensor_id: String,
    #[serde(default = "default_min_celsius")]
    pub min_celsius: f64,
    #[serde(default = "default_max_celsius")]
    pub max_celsius: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_oracle_port(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            version: default_model_version(),
            input_width: default_input_dim(),
            input_height: default_input_dim(),
            fallback_seed: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_bytes: default_max_image_bytes(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_address(),
            port: default_sensor_port(),
            sensor_id: default_sensor_id(),
            min_celsius: default_min_celsius(),
            max_celsius: default_max_celsius(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_address() -> String { "0.0.0.0".to_string() }
fn default_oracle_port() -> u16 { 5000 }
fn default_sensor_port() -> u16 { 5001 }
fn default_model_path() -> String { "quick_model_FINAL.h5".to_string() }
fn default_model_version() -> String { "quick_model_FINAL".to_string() }
fn default_input_dim() -> u32 { 128 }
fn default_fetch_timeout() -> u64 { 10 }
fn default_max_image_bytes() -> usize { 10 * 1024 * 1024 }
fn default_sensor_id() -> String { "TEMP_001".to_string() }
fn default_min_celsius() -> f64 { -5.0 }
fn default_max_celsius() -> f64 { 35.0 }

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path, e))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if !config.sensor.min_celsius.is_finite() || !config.sensor.max_celsius.is_finite() {
            return Err(anyhow::anyhow!(
                "sensor temperature bounds must be finite (got {} .. {})",
                config.sensor.min_celsius,
                config.sensor.max_celsius
            ));
        }
        if config.sensor.min_celsius >= config.sensor.max_celsius {
            return Err(anyhow::anyhow!(
                "sensor.min_celsius ({}) must be below sensor.max_celsius ({})",
                config.sensor.min_celsius,
                config.sensor.max_celsius
            ));
        }
        if config.model.input_width == 0 || config.model.input_height == 0 {
            return Err(anyhow::anyhow!("model input dimensions must be non-zero"));
        }
        Ok(config)
    }
}
