//! Checkpoint selection
//!
//! Sweeps a sorted list of parameter snapshots, scores each on a fixed set
//! of validation minibatches and picks the best one. With more than
//! [`SMOOTHING_MIN_SCORES`] scores the curve is smoothed before the arg-max
//! so that a single noisy checkpoint is not selected.

pub mod metrics;
pub mod smoothing;
pub mod stream;

pub use metrics::{precision_recall_f1, Metric, PrfScores};
pub use smoothing::{filtfilt, hann, normalized_hann, smooth_scores};
pub use stream::{ChordStream, ValidationBatch};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::{Array2, ArrayD};

use crate::config::SelectionConfig;
use crate::decoding::mle;
use crate::error::ChordError;

/// Smoothing is applied only when strictly more scores than this were collected
pub const SMOOTHING_MIN_SCORES: usize = 15;

/// Model that can load a parameter snapshot and classify a batch
pub trait Predictor {
    /// Replace the model parameters with the snapshot stored at `path`
    fn load_snapshot(&mut self, path: &Path) -> Result<(), ChordError>;

    /// Class posteriors of shape (batch, classes) for one input batch
    fn posterior(&mut self, inputs: &ArrayD<f32>) -> Result<Array2<f32>, ChordError>;
}

/// Outcome of a snapshot sweep
#[derive(Debug, Clone)]
pub struct Selection {
    /// Selected snapshot
    pub chosen: PathBuf,
    /// Index of `chosen` in `candidates`
    pub index: usize,
    /// Swept candidates, sorted, after skipping `start_idx`
    pub candidates: Vec<PathBuf>,
    /// Metric value per swept candidate; `-inf` for candidates that failed
    pub scores: Vec<f64>,
    /// Smoothed curve, when smoothing was applied
    pub smoothed: Option<Vec<f64>>,
    /// Whether the sweep stopped before the last candidate
    pub interrupted: bool,
}

/// Score the predictor on every batch, with labels concatenated across batches
pub fn score_batches<P: Predictor + ?Sized>(
    predictor: &mut P,
    batches: &[ValidationBatch],
) -> Result<PrfScores, ChordError> {
    let mut y_true = Vec::new();
    let mut y_pred = Vec::new();
    for batch in batches {
        let posterior = predictor.posterior(&batch.inputs)?;
        y_pred.extend(mle(posterior.view()));
        y_true.extend_from_slice(&batch.labels);
    }
    precision_recall_f1(&y_true, &y_pred)
}

/// Index of the best score, smoothing the curve first when it is long enough
///
/// Failed candidates (`-inf`) are replaced by the lowest finite score before
/// smoothing and can never be selected.
///
/// # Returns
///
/// The selected index and the smoothed curve if smoothing was applied, or
/// `None` if no score is finite.
pub fn choose_index(
    scores: &[f64],
    filter_len: usize,
) -> Result<Option<(usize, Option<Vec<f64>>)>, ChordError> {
    let floor = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !floor.is_finite() {
        return Ok(None);
    }

    let padlen = smoothing::filtfilt_padlen(filter_len);
    let smoothed = if scores.len() > SMOOTHING_MIN_SCORES {
        if scores.len() > padlen {
            let filled: Vec<f64> = scores
                .iter()
                .map(|&s| if s.is_finite() { s } else { floor })
                .collect();
            let mut curve = smooth_scores(&filled, filter_len)?;
            for (c, s) in curve.iter_mut().zip(scores) {
                if !s.is_finite() {
                    *c = f64::NEG_INFINITY;
                }
            }
            Some(curve)
        } else {
            log::warn!(
                "{} scores are too few for a window of {}, using raw scores",
                scores.len(),
                filter_len
            );
            None
        }
    } else {
        None
    };

    let curve = smoothed.as_deref().unwrap_or(scores);
    let mut best = 0;
    for (i, &v) in curve.iter().enumerate() {
        if v > curve[best] {
            best = i;
        }
    }
    Ok(Some((best, smoothed)))
}

/// Sweep candidate snapshots and select the best one
///
/// Candidates are sorted, the first `config.start_idx` are skipped and each
/// remaining one is loaded into `predictor` and scored on `batches`. A
/// candidate that fails to load or predict is logged and scored `-inf`.
/// Setting `stop` ends the sweep after the current candidate; selection then
/// runs on the scores collected so far.
///
/// # Errors
///
/// - `NoCandidates` if nothing is left to sweep or no candidate could be scored
/// - `InvalidParameter` if the scores are smoothed and `config.filter_len`
///   gives an empty Hann window
pub fn select_best<P: Predictor + ?Sized>(
    candidates: &[PathBuf],
    predictor: &mut P,
    batches: &[ValidationBatch],
    config: &SelectionConfig,
    stop: &AtomicBool,
) -> Result<Selection, ChordError> {
    let mut sorted = candidates.to_vec();
    sorted.sort();
    let swept: Vec<PathBuf> = sorted.into_iter().skip(config.start_idx).collect();
    if swept.is_empty() {
        return Err(ChordError::NoCandidates(format!(
            "{} candidates, starting at {}",
            candidates.len(),
            config.start_idx
        )));
    }

    let mut scores = Vec::with_capacity(swept.len());
    let mut interrupted = false;
    for (i, path) in swept.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            log::warn!("Stopping sweep after {} of {} candidates", i, swept.len());
            interrupted = true;
            break;
        }

        let idx = config.start_idx + i;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let scored = predictor
            .load_snapshot(path)
            .and_then(|_| score_batches(&mut *predictor, batches));
        match scored {
            Ok(prf) => {
                log::info!("{:>4}: ({}) {}", idx, prf, name);
                scores.push(prf.get(config.metric));
            }
            Err(e) => {
                log::warn!("{:>4}: skipping {} ({})", idx, name, e);
                scores.push(f64::NEG_INFINITY);
            }
        }
    }

    let (index, smoothed) = choose_index(&scores, config.filter_len)?.ok_or_else(|| {
        ChordError::NoCandidates(format!("none of {} swept candidates scored", scores.len()))
    })?;

    log::info!(
        "Selected {} ({} {:.4}{})",
        swept[index].display(),
        config.metric,
        scores[index],
        if smoothed.is_some() { ", smoothed" } else { "" }
    );

    Ok(Selection {
        chosen: swept[index].clone(),
        index,
        candidates: swept,
        scores,
        smoothed,
        interrupted,
    })
}

/// Draw `config.num_obs` batches from `stream` once, then run [`select_best`]
pub fn find_best_param_file<P: Predictor + ?Sized>(
    candidates: &[PathBuf],
    predictor: &mut P,
    stream: &mut ChordStream,
    config: &SelectionConfig,
    stop: &AtomicBool,
) -> Result<Selection, ChordError> {
    log::debug!("Drawing {} validation batches", config.num_obs);
    let batches = stream.draw_batches(config.num_obs);
    select_best(candidates, predictor, &batches, config, stop)
}
