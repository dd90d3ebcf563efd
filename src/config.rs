//! Configuration parameters for decoding and checkpoint selection

use std::path::Path;

use serde::Deserialize;

use crate::error::ChordError;
use crate::selection::metrics::Metric;

/// Decoder configuration
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Strategy name: "mle", "medfilt_mle" or "viterbi" (default: "viterbi")
    pub strategy: String,

    /// Self-transition penalty for "viterbi" (default: 0.0)
    /// Higher values produce longer runs of the same class
    pub penalty: f64,

    /// Median filter window as (frames, classes) for "medfilt_mle" (default: (41, 1))
    /// Both dimensions must be odd
    pub medfilt_window: (usize, usize),
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            strategy: "viterbi".to_string(),
            penalty: 0.0,
            medfilt_window: (41, 1),
        }
    }
}

/// Checkpoint selection configuration
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Score used to rank snapshots (default: Recall)
    pub metric: Metric,

    /// Hann window length for score smoothing (default: 5)
    /// Checked only when a sweep is long enough to be smoothed
    pub filter_len: usize,

    /// Number of sorted candidates to skip before sweeping (default: 0)
    pub start_idx: usize,

    /// Number of validation minibatches held fixed for the sweep (default: 100)
    pub num_obs: usize,

    /// Observations per minibatch (default: 200)
    pub batch_size: usize,

    /// Seed for validation sampling (default: 0)
    pub seed: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Recall,
            filter_len: 5,
            start_idx: 0,
            num_obs: 100,
            batch_size: 200,
            seed: 0,
        }
    }
}

/// Best configuration found by a prior validation run
#[derive(Debug, Clone, Deserialize)]
pub struct BestConfig {
    /// Viterbi self-transition penalty
    pub penalty: f64,
}

/// Validation statistics file; only `best_config` is consumed
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationStats {
    /// Winning decoder parameters
    pub best_config: BestConfig,
}

impl ValidationStats {
    /// Load validation statistics from a JSON file
    pub fn load(path: &Path) -> Result<Self, ChordError> {
        if !path.exists() {
            return Err(ChordError::MissingInputFile(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse validation statistics from JSON text
    pub fn from_json(text: &str) -> Result<Self, ChordError> {
        let stats: ValidationStats = serde_json::from_str(text)?;
        log::debug!("Loaded validation stats: penalty={}", stats.best_config.penalty);
        Ok(stats)
    }

    /// Decoder configuration using the stored penalty
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            penalty: self.best_config.penalty,
            ..DecoderConfig::default()
        }
    }
}
