use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use image::imageops::FilterType;
use tracing::debug;

use crate::config::FetchConfig;

/// Normalized RGB image, row-major, channels in [0, 1]
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Mean over all channels of all pixels
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as f64).sum::<f64>() / self.data.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .data
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / self.data.len() as f64;
        var.sqrt()
    }
}

/// Decode a base64 image payload, accepting an optional `data:image/...;base64,` prefix
pub fn decode_base64_image(payload: &str) -> anyhow::Result<Vec<u8>> {
    let encoded = if payload.starts_with("data:image") {
        payload
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| anyhow::anyhow!("data URL has no payload"))?
    } else {
        payload
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("invalid base64 image data")
}

/// Decode, convert to RGB, resize to the model input size and normalize
pub fn preprocess(bytes: &[u8], (width, height): (u32, u32)) -> anyhow::Result<ImageTensor> {
    let decoded = image::load_from_memory(bytes).context("failed to decode image")?;
    let rgb = decoded.to_rgb8();
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);

    let data: Vec<f32> = resized.as_raw().iter().map(|&b| b as f32 / 255.0).collect();
    debug!(
        "Preprocessed image {}x{} -> {}x{}x3",
        rgb.width(),
        rgb.height(),
        width,
        height
    );

    Ok(ImageTensor { width, height, data })
}

/// Downloads images by URL for the Chainlink-style endpoint. No retries.
#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    pub async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to download image from {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("image download from {} returned {}", url, status));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(anyhow::anyhow!(
                    "image at {} is {} bytes (limit {})",
                    url,
                    len,
                    self.max_bytes
                ));
            }
        }

        // Chunked responses carry no length up front; stop as soon as the cap is crossed
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("failed to read image body from {}", url))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(anyhow::anyhow!(
                    "image at {} exceeds {} bytes",
                    url,
                    self.max_bytes
                ));
            }
            body.extend_from_slice(&chunk);
        }
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
