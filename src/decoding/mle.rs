//! Frame-wise maximum-likelihood decoding

use ndarray::{ArrayView1, ArrayView2};

use super::median_filter::median_filter_2d;
use crate::error::ChordError;

/// Index of the largest value; the first index wins ties and NaNs never win
pub(crate) fn argmax(values: ArrayView1<'_, f32>) -> usize {
    let mut best_idx = 0;
    let mut best = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            best_idx = i;
        }
    }
    best_idx
}

/// Per-frame argmax of a (frames x classes) posteriorgram
pub fn mle(posterior: ArrayView2<'_, f32>) -> Vec<usize> {
    posterior.outer_iter().map(argmax).collect()
}

/// Median-filter the posteriorgram, then take the per-frame argmax
///
/// # Arguments
///
/// * `posterior` - (frames x classes) posteriorgram
/// * `window` - Median window as (frames, classes), e.g. (41, 1)
///
/// # Errors
///
/// Returns `InvalidParameter` if a window dimension is zero or even
pub fn medfilt_mle(
    posterior: ArrayView2<'_, f32>,
    window: (usize, usize),
) -> Result<Vec<usize>, ChordError> {
    let smoothed = median_filter_2d(posterior, window)?;
    Ok(mle(smoothed.view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    #[test]
    fn test_mle_basic() {
        let posterior = arr2(&[[0.1f32, 0.9], [0.8, 0.2], [0.1, 0.9]]);
        assert_eq!(mle(posterior.view()), vec![1, 0, 1]);
    }

    #[test]
    fn test_mle_tie_prefers_first() {
        let posterior = arr2(&[[0.5f32, 0.5], [0.2, 0.4]]);
        assert_eq!(mle(posterior.view()), vec![0, 1]);
    }

    #[test]
    fn test_mle_length_and_range() {
        let posterior = Array2::from_shape_fn((50, 7), |(t, c)| ((t * 31 + c * 17) % 11) as f32);
        let decoded = mle(posterior.view());
        assert_eq!(decoded.len(), 50);
        assert!(decoded.iter().all(|&idx| idx < 7));
    }

    #[test]
    fn test_medfilt_unit_window_matches_mle() {
        let posterior = Array2::from_shape_fn((20, 5), |(t, c)| ((t * 7 + c * 3) % 13) as f32 / 13.0);
        let smoothed = medfilt_mle(posterior.view(), (1, 1)).unwrap();
        assert_eq!(smoothed, mle(posterior.view()));
    }

    #[test]
    fn test_medfilt_suppresses_transient() {
        let posterior = arr2(&[
            [0.9f32, 0.1],
            [0.8, 0.2],
            [0.3, 0.7],
            [0.9, 0.1],
            [0.7, 0.3],
        ]);
        assert_eq!(mle(posterior.view()), vec![0, 0, 1, 0, 0]);
        assert_eq!(medfilt_mle(posterior.view(), (3, 1)).unwrap(), vec![0, 0, 0, 0, 0]);
    }
}
