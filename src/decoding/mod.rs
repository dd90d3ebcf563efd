//! Posteriorgram decoding
//!
//! Converts a (frames x classes) posteriorgram into one class index per frame:
//! - `mle`: per-frame argmax
//! - `medfilt_mle`: argmax after 2D median smoothing
//! - `viterbi`: dynamic-programming decode with a class-change penalty

pub mod median_filter;
pub mod mle;
pub mod viterbi;

pub use median_filter::median_filter_2d;
pub use mle::{medfilt_mle, mle};
pub use viterbi::{viterbi, viterbi_with_transitions};

use ndarray::ArrayView2;

use crate::config::DecoderConfig;
use crate::error::ChordError;

/// Decoding strategy, selected by name
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStrategy {
    /// Per-frame argmax
    Mle,
    /// Median filter with a (frames, classes) window, then argmax
    MedfiltMle {
        /// Window as (frames, classes); both odd
        window: (usize, usize),
    },
    /// Penalized Viterbi decode over a uniform transition matrix
    Viterbi {
        /// Cost charged on every class change (>= 0)
        penalty: f64,
    },
}

impl DecodeStrategy {
    /// Names accepted by [`DecodeStrategy::from_name`]
    pub const NAMES: [&'static str; 3] = ["mle", "medfilt_mle", "viterbi"];

    /// Build a strategy from its name, taking parameters from `config`
    ///
    /// # Errors
    ///
    /// - `UnknownStrategy` if `name` is not one of [`DecodeStrategy::NAMES`]
    /// - `InvalidParameter` if the penalty is negative or the window is not odd
    pub fn from_name(name: &str, config: &DecoderConfig) -> Result<Self, ChordError> {
        let strategy = match name {
            "mle" => DecodeStrategy::Mle,
            "medfilt_mle" => DecodeStrategy::MedfiltMle {
                window: config.medfilt_window,
            },
            "viterbi" => DecodeStrategy::Viterbi {
                penalty: config.penalty,
            },
            other => return Err(ChordError::UnknownStrategy(other.to_string())),
        };
        strategy.validate()?;
        Ok(strategy)
    }

    /// Build the strategy named by `config.strategy`
    pub fn from_config(config: &DecoderConfig) -> Result<Self, ChordError> {
        Self::from_name(&config.strategy, config)
    }

    /// Strategy name
    pub fn name(&self) -> &'static str {
        match self {
            DecodeStrategy::Mle => "mle",
            DecodeStrategy::MedfiltMle { .. } => "medfilt_mle",
            DecodeStrategy::Viterbi { .. } => "viterbi",
        }
    }

    fn validate(&self) -> Result<(), ChordError> {
        match *self {
            DecodeStrategy::Mle => Ok(()),
            DecodeStrategy::MedfiltMle { window } => median_filter::validate_window(window),
            DecodeStrategy::Viterbi { penalty } => viterbi::validate_penalty(penalty),
        }
    }

    /// Decode a posteriorgram into per-frame class indices
    pub fn decode(&self, posterior: ArrayView2<'_, f32>) -> Result<Vec<usize>, ChordError> {
        decode(posterior, self)
    }
}

/// Decode a (frames x classes) posteriorgram with the given strategy
///
/// # Returns
///
/// One class index in `[0, classes)` per frame. An empty posteriorgram yields
/// an empty sequence.
///
/// # Errors
///
/// Returns `InvalidParameter` if the strategy parameters are invalid or the
/// posteriorgram has frames but no classes.
pub fn decode(
    posterior: ArrayView2<'_, f32>,
    strategy: &DecodeStrategy,
) -> Result<Vec<usize>, ChordError> {
    let (n_frames, n_classes) = posterior.dim();
    log::debug!(
        "Decoding {} frames x {} classes with {}",
        n_frames,
        n_classes,
        strategy.name()
    );

    strategy.validate()?;

    if n_frames == 0 {
        return Ok(vec![]);
    }
    if n_classes == 0 {
        return Err(ChordError::InvalidParameter(
            "Posteriorgram has frames but no classes".to_string(),
        ));
    }

    match *strategy {
        DecodeStrategy::Mle => Ok(mle(posterior)),
        DecodeStrategy::MedfiltMle { window } => medfilt_mle(posterior, window),
        DecodeStrategy::Viterbi { penalty } => viterbi(posterior, penalty),
    }
}
