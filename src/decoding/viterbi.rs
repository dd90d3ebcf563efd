//! Penalized Viterbi decoding
//!
//! Finds the class sequence maximizing the summed frame log-probabilities minus
//! `penalty` for every change of class between consecutive frames. With the
//! all-ones transition matrix used by the chord pipeline this is plain Viterbi
//! over a uniform transition model where self-transitions are favored by
//! `penalty`.
//!
//! Cost is O(T * C^2) time and O(T * C) memory for the back-pointers.

use ndarray::{Array2, ArrayView2};

use crate::error::ChordError;

/// Floor applied before taking logarithms, so zero probabilities stay finite
const LOG_FLOOR: f64 = 1e-10;

pub(crate) fn validate_penalty(penalty: f64) -> Result<(), ChordError> {
    if !(penalty >= 0.0) {
        return Err(ChordError::InvalidParameter(format!(
            "Viterbi penalty must be non-negative, got {}",
            penalty
        )));
    }
    Ok(())
}

/// Viterbi decode with a uniform (all-ones) transition matrix
///
/// # Arguments
///
/// * `posterior` - (frames x classes) posteriorgram
/// * `penalty` - Cost charged on every class change; 0 reduces to per-frame argmax
///
/// # Returns
///
/// Decoded class index per frame
///
/// # Errors
///
/// Returns `InvalidParameter` if `penalty` is negative or NaN
pub fn viterbi(posterior: ArrayView2<'_, f32>, penalty: f64) -> Result<Vec<usize>, ChordError> {
    let n_classes = posterior.ncols();
    let transitions = Array2::<f32>::ones((n_classes, n_classes));
    viterbi_with_transitions(posterior, transitions.view(), penalty)
}

/// Viterbi decode with an explicit (classes x classes) transition matrix
///
/// `transitions[[i, j]]` is the (unnormalized) probability of moving from
/// class `i` to class `j`. The penalty is subtracted on every `i != j` move.
pub fn viterbi_with_transitions(
    posterior: ArrayView2<'_, f32>,
    transitions: ArrayView2<'_, f32>,
    penalty: f64,
) -> Result<Vec<usize>, ChordError> {
    validate_penalty(penalty)?;

    let (n_frames, n_classes) = posterior.dim();
    if transitions.dim() != (n_classes, n_classes) {
        return Err(ChordError::ShapeMismatch(format!(
            "Transition matrix must be {}x{}, got {:?}",
            n_classes,
            n_classes,
            transitions.dim()
        )));
    }

    if n_frames == 0 {
        return Ok(vec![]);
    }
    if n_classes == 0 {
        return Err(ChordError::InvalidParameter(
            "Posteriorgram has frames but no classes".to_string(),
        ));
    }

    log::debug!(
        "Viterbi decoding {} frames x {} classes, penalty={}",
        n_frames,
        n_classes,
        penalty
    );

    let log_p = |t: usize, j: usize| (posterior[[t, j]] as f64).max(LOG_FLOOR).ln();
    let log_trans = transitions.mapv(|v| {
        let v = v as f64;
        // A true zero stays impossible; only posteriors are floored
        if v > 0.0 { v.ln() } else { f64::NEG_INFINITY }
    });

    let mut scores: Vec<f64> = (0..n_classes).map(|j| log_p(0, j)).collect();
    let mut next = vec![0.0f64; n_classes];
    let mut back_pointers = Array2::<usize>::zeros((n_frames, n_classes));

    for t in 1..n_frames {
        for j in 0..n_classes {
            let mut best = f64::NEG_INFINITY;
            let mut best_prev = j;
            for i in 0..n_classes {
                let mut score = scores[i] + log_trans[[i, j]];
                if i != j {
                    score -= penalty;
                }
                if score > best {
                    best = score;
                    best_prev = i;
                }
            }
            next[j] = best + log_p(t, j);
            back_pointers[[t, j]] = best_prev;
        }
        std::mem::swap(&mut scores, &mut next);
    }

    // Back-trace from the best final state
    let mut state = 0;
    let mut best_final = f64::NEG_INFINITY;
    for (j, &score) in scores.iter().enumerate() {
        if score > best_final {
            best_final = score;
            state = j;
        }
    }

    let mut path = vec![0usize; n_frames];
    path[n_frames - 1] = state;
    for t in (1..n_frames).rev() {
        state = back_pointers[[t, state]];
        path[t - 1] = state;
    }

    log::debug!("Viterbi path score: {:.4}", best_final);

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::mle::mle;
    use ndarray::arr2;

    #[test]
    fn test_zero_penalty_matches_mle() {
        let posterior = arr2(&[[0.1f32, 0.9], [0.8, 0.2], [0.1, 0.9]]);
        assert_eq!(viterbi(posterior.view(), 0.0).unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_zero_penalty_matches_mle_multiclass() {
        let posterior = Array2::from_shape_fn((40, 6), |(t, c)| {
            (((t * 13 + c * 7) % 17) as f32 + 1.0) / 20.0
        });
        assert_eq!(viterbi(posterior.view(), 0.0).unwrap(), mle(posterior.view()));
    }

    #[test]
    fn test_large_penalty_collapses() {
        // Class 0 has the higher total log-probability
        let posterior = arr2(&[[0.6f32, 0.4], [0.3, 0.7], [0.6, 0.4], [0.55, 0.45]]);
        assert_eq!(mle(posterior.view()), vec![0, 1, 0, 0]);
        assert_eq!(viterbi(posterior.view(), 100.0).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_penalty_trades_fit_for_stability() {
        let posterior = arr2(&[
            [0.9f32, 0.1],
            [0.9, 0.1],
            [0.4, 0.6],
            [0.9, 0.1],
            [0.1, 0.9],
            [0.1, 0.9],
        ]);
        // A single weak frame is absorbed, the sustained change is kept
        assert_eq!(viterbi(posterior.view(), 1.0).unwrap(), vec![0, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_zero_probabilities_are_floored() {
        let posterior = arr2(&[[1.0f32, 0.0], [0.0, 1.0], [1.0, 0.0]]);
        assert_eq!(viterbi(posterior.view(), 0.0).unwrap(), vec![0, 1, 0]);
    }

    #[test]
    fn test_empty_posterior() {
        let posterior = Array2::<f32>::zeros((0, 3));
        assert!(viterbi(posterior.view(), 2.0).unwrap().is_empty());
    }

    #[test]
    fn test_negative_penalty_rejected() {
        let posterior = arr2(&[[0.5f32, 0.5]]);
        assert!(matches!(
            viterbi(posterior.view(), -1.0),
            Err(ChordError::InvalidParameter(_))
        ));
        assert!(viterbi(posterior.view(), f64::NAN).is_err());
    }

    #[test]
    fn test_transition_shape_checked() {
        let posterior = arr2(&[[0.5f32, 0.5]]);
        let transitions = Array2::<f32>::ones((3, 3));
        assert!(matches!(
            viterbi_with_transitions(posterior.view(), transitions.view(), 0.0),
            Err(ChordError::ShapeMismatch(_))
        ));
    }
}
