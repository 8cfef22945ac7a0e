use std::path::Path;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ModelConfig;
use crate::imaging::ImageTensor;
use crate::scorer::ProbabilityPair;

/// Output classes, in model output order
pub const CLASSES: [&str; 2] = ["fresh", "rotten"];

/// Whether a native inference backend is compiled in
pub const INFERENCE_BACKEND_AVAILABLE: bool = false;

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// "trained" or "fallback"
    pub kind: String,
    pub model_file: String,
    pub input_shape: [u32; 3],
    pub note: Option<String>,
}

/// Produce classifier: image in, fresh/rotten probabilities out
pub trait Classifier: Send + Sync {
    fn predict(&self, image: &ImageTensor) -> anyhow::Result<ProbabilityPair>;

    /// (width, height) the classifier expects
    fn input_size(&self) -> (u32, u32);

    fn info(&self) -> ModelInfo;

    fn is_fallback(&self) -> bool {
        self.info().kind == "fallback"
    }
}

/// Brightness heuristic used when no trained model can be loaded.
///
/// Darker images lean rotten, brighter images lean fresh:
/// - mean < 0.3: fresh in [0.2, 0.5)
/// - mean > 0.7: fresh in [0.7, 1.0)
/// - otherwise:  fresh in [0.4, 0.8)
pub struct HeuristicModel {
    input_size: (u32, u32),
    model_file: String,
    note: String,
    rng: Mutex<StdRng>,
}

impl HeuristicModel {
    pub fn new(config: &ModelConfig, note: impl Into<String>) -> Self {
        let rng = match config.fallback_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            input_size: (config.input_width, config.input_height),
            model_file: config.path.clone(),
            note: note.into(),
            rng: Mutex::new(rng),
        }
    }
}

impl Classifier for HeuristicModel {
    fn predict(&self, image: &ImageTensor) -> anyhow::Result<ProbabilityPair> {
        let brightness = image.mean();
        let jitter: f64 = self.rng.lock().gen();

        let fresh = if brightness < 0.3 {
            0.2 + jitter * 0.3
        } else if brightness > 0.7 {
            0.7 + jitter * 0.3
        } else {
            0.4 + jitter * 0.4
        };

        Ok(ProbabilityPair::new(fresh, 1.0 - fresh))
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            kind: "fallback".to_string(),
            model_file: self.model_file.clone(),
            input_shape: [self.input_size.1, self.input_size.0, 3],
            note: Some(self.note.clone()),
        }
    }
}

/// Resolve the configured classifier.
///
/// Falls back to [`HeuristicModel`] whenever the trained weights cannot be
/// used; startup never fails because of the model.
pub fn load_classifier(config: &ModelConfig) -> Box<dyn Classifier> {
    let path = Path::new(&config.path);

    let reason = if !path.exists() {
        format!("model file not found: {}", config.path)
    } else {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown");
        format!("no inference backend for '.{}' models in this build", ext)
    };

    error!("❌ Failed to load model: {}", reason);
    warn!("Using heuristic fallback model for predictions");

    let model = HeuristicModel::new(
        config,
        format!("Using fallback model ({}) - load the trained model for real predictions", reason),
    );
    info!(
        "Classifier ready: kind=fallback, input={}x{}",
        config.input_width, config.input_height
    );
    Box::new(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_config(seed: u64) -> ModelConfig {
        ModelConfig {
            fallback_seed: Some(seed),
            input_width: 8,
            input_height: 8,
            ..ModelConfig::default()
        }
    }

    fn uniform(value: f32) -> ImageTensor {
        ImageTensor {
            width: 8,
            height: 8,
            data: vec![value; 8 * 8 * 3],
        }
    }

    #[test]
    fn test_dark_image_leans_rotten() {
        let model = HeuristicModel::new(&seeded_config(1), "test");
        for _ in 0..100 {
            let p = model.predict(&uniform(0.1)).unwrap();
            assert!((0.2..0.5).contains(&p.fresh), "fresh = {}", p.fresh);
            assert!((p.fresh + p.rotten - 1.0).abs() < 1e-12);
            assert!(p.rotten > p.fresh);
        }
    }

    #[test]
    fn test_bright_image_leans_fresh() {
        let model = HeuristicModel::new(&seeded_config(2), "test");
        for _ in 0..100 {
            let p = model.predict(&uniform(0.9)).unwrap();
            assert!((0.7..1.0).contains(&p.fresh), "fresh = {}", p.fresh);
            assert!(p.fresh > p.rotten);
        }
    }

    #[test]
    fn test_medium_image_range() {
        let model = HeuristicModel::new(&seeded_config(3), "test");
        for _ in 0..100 {
            let p = model.predict(&uniform(0.5)).unwrap();
            assert!((0.4..0.8).contains(&p.fresh), "fresh = {}", p.fresh);
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = HeuristicModel::new(&seeded_config(7), "a");
        let b = HeuristicModel::new(&seeded_config(7), "b");
        for _ in 0..10 {
            assert_eq!(a.predict(&uniform(0.5)).unwrap(), b.predict(&uniform(0.5)).unwrap());
        }
    }

    #[test]
    fn test_missing_model_falls_back() {
        let config = ModelConfig {
            path: "/nonexistent/quick_model_FINAL.h5".to_string(),
            ..seeded_config(0)
        };
        let classifier = load_classifier(&config);
        assert!(classifier.is_fallback());
        assert_eq!(classifier.input_size(), (8, 8));
        let info = classifier.info();
        assert_eq!(info.input_shape, [8, 8, 3]);
        assert!(info.note.unwrap().contains("model file not found"));
    }
}
