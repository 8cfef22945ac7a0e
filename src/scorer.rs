use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::{OracleError, OracleResult};

/// Number of leading hex characters of a hash that drive the seed
const HASH_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Fresh,
    Rotten,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Fresh => "fresh",
            Verdict::Rotten => "rotten",
        }
    }
}

/// Raw fresh/rotten probabilities, as produced by a classifier.
/// Not normalized; the two values need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityPair {
    pub fresh: f64,
    pub rotten: f64,
}

impl ProbabilityPair {
    pub fn new(fresh: f64, rotten: f64) -> Self {
        Self { fresh, rotten }
    }
}

#[derive(Debug, Clone)]
pub enum ScoreInput {
    HashSeed(String),
    Probabilities(ProbabilityPair),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub damage_score: u8,
    pub verdict: Verdict,
    pub confidence_percent: f64,
    /// Only present for probability-pair inputs
    pub fresh_probability_percent: Option<f64>,
    pub rotten_probability_percent: Option<f64>,
}

/// Seed sub-range mapped to a verdict and a fresh-probability formula:
/// `fresh = base + (seed / 100) * slope`
struct Tier {
    upper: u32,
    verdict: Verdict,
    base: f64,
    slope: f64,
}

const HASH_TIERS: [Tier; 4] = [
    Tier { upper: 20, verdict: Verdict::Rotten, base: 0.05, slope: 0.25 },
    Tier { upper: 40, verdict: Verdict::Rotten, base: 0.30, slope: 0.25 },
    Tier { upper: 80, verdict: Verdict::Fresh, base: 0.65, slope: 0.25 },
    Tier { upper: 100, verdict: Verdict::Fresh, base: 0.85, slope: 0.15 },
];

/// Deterministic damage scorer.
///
/// Maps an image hash or a classifier's probability pair onto a bounded
/// 0-100 damage score plus verdict. Hash scoring is a pure function of the
/// first 8 hex characters. The only shared state is a request counter,
/// bumped once per successfully produced score.
pub struct DeterministicScorer {
    request_count: AtomicU64,
}

impl Default for DeterministicScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterministicScorer {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
        }
    }

    /// Number of scores produced so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn score(&self, input: &ScoreInput) -> OracleResult<ScoreResult> {
        match input {
            ScoreInput::HashSeed(hash) => self.score_from_hash(hash),
            ScoreInput::Probabilities(pair) => {
                Ok(self.score_from_probabilities(pair.fresh, pair.rotten))
            }
        }
    }

    pub fn score_from_hash(&self, hash: &str) -> OracleResult<ScoreResult> {
        let seed = hash_seed(hash)?;
        let tier = HASH_TIERS
            .iter()
            .find(|t| seed < t.upper)
            .unwrap_or(&HASH_TIERS[HASH_TIERS.len() - 1]);

        let fresh = tier.base + (seed as f64 / 100.0) * tier.slope;
        let result = ScoreResult {
            damage_score: clamp_score((1.0 - fresh) * 100.0),
            verdict: tier.verdict,
            confidence_percent: clamp_percent(fresh.max(1.0 - fresh) * 100.0),
            fresh_probability_percent: None,
            rotten_probability_percent: None,
        };

        self.request_count.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    /// Ties go to rotten. NaN inputs are not rejected; they clamp to 0.
    pub fn score_from_probabilities(&self, fresh: f64, rotten: f64) -> ScoreResult {
        let (verdict, winning, raw_damage) = if fresh > rotten {
            (Verdict::Fresh, fresh, (1.0 - fresh) * 100.0)
        } else {
            (Verdict::Rotten, rotten, rotten * 100.0)
        };

        self.request_count.fetch_add(1, Ordering::Relaxed);
        ScoreResult {
            damage_score: clamp_score(raw_damage),
            verdict,
            confidence_percent: clamp_percent(winning * 100.0),
            fresh_probability_percent: Some(clamp_percent(fresh * 100.0)),
            rotten_probability_percent: Some(clamp_percent(rotten * 100.0)),
        }
    }

    /// Clock-driven demo score. Not reproducible across calls.
    pub fn score_simple(&self, secs_since_epoch: u64) -> u8 {
        let seed = secs_since_epoch % 100;
        let score = match seed {
            s if s < 25 => 65 + (s % 25),
            s if s < 75 => 20 + (s % 30),
            s => s % 20,
        };
        self.request_count.fetch_add(1, Ordering::Relaxed);
        score as u8
    }
}

/// `parse_hex(hash[0..8]) mod 100`
fn hash_seed(hash: &str) -> OracleResult<u32> {
    let prefix = hash
        .get(..HASH_PREFIX_LEN)
        .filter(|p| p.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| {
            OracleError::invalid(format!(
                "hash must start with {} hex characters, got {:?}",
                HASH_PREFIX_LEN, hash
            ))
        })?;
    let value = u32::from_str_radix(prefix, 16)
        .map_err(|e| OracleError::invalid(format!("invalid hash prefix {:?}: {}", prefix, e)))?;
    Ok(value % 100)
}

fn clamp_score(raw: f64) -> u8 {
    // NaN casts to 0
    raw.round().clamp(0.0, 100.0) as u8
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
