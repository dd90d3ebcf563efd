//! # Stratum Chords
//!
//! Post-processing and model-selection tools for frame-level chord
//! recognition, plus the small layer library the classifiers are built from.
//!
//! ## Features
//!
//! - **Decoding**: posteriorgram to class sequence by argmax, median-filtered
//!   argmax or penalized Viterbi
//! - **Aggregation**: duration-weighted class histograms keyed by ground-truth label
//! - **Checkpoint selection**: sweep parameter snapshots on fixed validation
//!   batches, with Hann-smoothed score curves
//! - **Layers**: affine, convolution, softmax, multi-softmax, RBF and
//!   energy-PDF layers with shape inference and a parameter lifecycle
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use stratum_chords::estimate_chords;
//!
//! let estimates = estimate_chords(
//!     Path::new("posteriors.json"),
//!     Path::new("validation.json"),
//!     "viterbi",
//! )?;
//! if let Some(merged) = &estimates.merged {
//!     println!("{} labels, total weight {}", merged.len(), merged.total_weight());
//! }
//! # Ok::<(), stratum_chords::ChordError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Network (layers) → Posteriorgram → Decoding → Aggregation → Output
//! Snapshots + validation stream → Selection → Chosen snapshot
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregation;
pub mod config;
pub mod decoding;
pub mod error;
pub mod io;
pub mod layers;
pub mod selection;

use std::path::Path;
use std::sync::atomic::AtomicBool;

// Re-export main types
pub use aggregation::{aggregate, CollectionEstimates, EstimationMap};
pub use config::{DecoderConfig, SelectionConfig, ValidationStats};
pub use decoding::{decode, DecodeStrategy};
pub use error::ChordError;
pub use layers::{Layer, LayerSpec, Network, NetworkDefinition};
pub use selection::{select_best, Metric, Predictor, Selection};

/// Decode and aggregate every record of a posterior stash
///
/// The Viterbi penalty is read from `best_config.penalty` of the validation
/// file; `strategy` picks the decoder by name.
///
/// # Errors
///
/// - `MissingInputFile` if either input file does not exist
/// - `UnknownStrategy` / `InvalidParameter` for a bad strategy or penalty
///
/// Records that fail to decode are logged and skipped.
pub fn estimate_chords(
    posterior_file: &Path,
    validation_file: &Path,
    strategy: &str,
) -> Result<CollectionEstimates, ChordError> {
    use std::time::Instant;
    let start_time = Instant::now();

    let stats = ValidationStats::load(validation_file)?;
    let strategy = DecodeStrategy::from_name(strategy, &stats.decoder_config())?;
    let stash = io::Stash::open(posterior_file)?;

    log::info!(
        "Estimating {} records with {:?}",
        stash.len(),
        strategy
    );
    let estimates = aggregation::estimate_collection(&stash, &strategy);

    log::debug!(
        "Estimation finished in {:.1} ms",
        start_time.elapsed().as_secs_f32() * 1000.0
    );
    Ok(estimates)
}

/// Pick the best parameter snapshot listed in `param_textlist`
///
/// Builds the network from `transform_file`, draws `config.num_obs`
/// validation batches from the chord records in `data_file`, and sweeps
/// the listed snapshots. The network's input must be `(1, time_dim, bins)`.
///
/// # Errors
///
/// - `MissingInputFile` if an input file does not exist
/// - `ShapeMismatch` if the network input is not `(1, time_dim, bins)` or its
///   bin count differs from the validation data
/// - `NoCandidates` if no snapshot could be scored
pub fn select_param_file(
    data_file: &Path,
    transform_file: &Path,
    param_textlist: &Path,
    config: &SelectionConfig,
    stop: &AtomicBool,
) -> Result<Selection, ChordError> {
    let mut network = Network::from_definition_file(transform_file, config.seed)?;
    let (time_dim, bins) = match network.input_shape() {
        [1, time_dim, bins] => (*time_dim, *bins),
        other => {
            return Err(ChordError::ShapeMismatch(format!(
                "Network input {:?} is not a single map of (1, time, bins)",
                other
            )))
        }
    };

    let stash = io::Stash::open(data_file)?;
    let candidates = io::load_textlist(param_textlist)?;
    let mut stream =
        selection::ChordStream::new(&stash, time_dim, config.batch_size, config.seed)?;
    if stream.num_bins() != bins {
        return Err(ChordError::ShapeMismatch(format!(
            "Network expects {} bins, validation data has {}",
            bins,
            stream.num_bins()
        )));
    }

    log::info!(
        "Sweeping {} snapshots on {} batches of {}",
        candidates.len(),
        config.num_obs,
        config.batch_size
    );
    selection::find_best_param_file(&candidates, &mut network, &mut stream, config, stop)
}
