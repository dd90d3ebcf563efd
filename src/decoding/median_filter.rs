//! 2D median filtering of posteriorgrams
//!
//! Edges are handled by replicating the nearest frame / class, so every output
//! value is the median of a full window.

use ndarray::{Array2, ArrayView2};

use crate::error::ChordError;

/// Check that a (frames, classes) median window is usable
pub(crate) fn validate_window(window: (usize, usize)) -> Result<(), ChordError> {
    let (height, width) = window;
    if height == 0 || width == 0 {
        return Err(ChordError::InvalidParameter(format!(
            "Median filter window must be non-empty, got {:?}",
            window
        )));
    }
    if height % 2 == 0 || width % 2 == 0 {
        return Err(ChordError::InvalidParameter(format!(
            "Median filter window dimensions must be odd, got {:?}",
            window
        )));
    }
    Ok(())
}

/// Median-filter a 2D array with a centered (rows, cols) window
///
/// # Arguments
///
/// * `data` - Input array, typically a (frames x classes) posteriorgram
/// * `window` - Window size as (rows, cols); both must be odd
///
/// # Returns
///
/// Filtered array with the same shape as `data`
///
/// # Errors
///
/// Returns `InvalidParameter` if a window dimension is zero or even
pub fn median_filter_2d(
    data: ArrayView2<'_, f32>,
    window: (usize, usize),
) -> Result<Array2<f32>, ChordError> {
    validate_window(window)?;

    let (n_rows, n_cols) = data.dim();
    let half_r = (window.0 / 2) as isize;
    let half_c = (window.1 / 2) as isize;

    if n_rows == 0 || n_cols == 0 {
        return Ok(data.to_owned());
    }

    let clamp = |idx: isize, len: usize| idx.clamp(0, len as isize - 1) as usize;
    let mut scratch = Vec::with_capacity(window.0 * window.1);

    let filtered = Array2::from_shape_fn((n_rows, n_cols), |(r, c)| {
        scratch.clear();
        for dr in -half_r..=half_r {
            let rr = clamp(r as isize + dr, n_rows);
            for dc in -half_c..=half_c {
                let cc = clamp(c as isize + dc, n_cols);
                scratch.push(data[[rr, cc]]);
            }
        }
        let mid = scratch.len() / 2;
        let (_, median, _) = scratch.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        *median
    });

    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_identity_window() {
        let data = arr2(&[[0.1f32, 0.9], [0.7, 0.3]]);
        let filtered = median_filter_2d(data.view(), (1, 1)).unwrap();
        assert_eq!(filtered, data);
    }

    #[test]
    fn test_removes_single_frame_spike() {
        let data = arr2(&[[0.9f32, 0.1], [0.8, 0.2], [0.1, 0.9], [0.9, 0.1], [0.8, 0.2]]);
        let filtered = median_filter_2d(data.view(), (3, 1)).unwrap();
        assert_eq!(filtered[[2, 0]], 0.8);
        assert_eq!(filtered[[2, 1]], 0.2);
    }

    #[test]
    fn test_edges_replicate() {
        // First frame window is [x0, x0, x1] under replication
        let data = arr2(&[[1.0f32], [5.0], [9.0]]);
        let filtered = median_filter_2d(data.view(), (3, 1)).unwrap();
        assert_eq!(filtered[[0, 0]], 1.0);
        assert_eq!(filtered[[1, 0]], 5.0);
        assert_eq!(filtered[[2, 0]], 9.0);
    }

    #[test]
    fn test_window_larger_than_input() {
        let data = arr2(&[[0.2f32, 0.8], [0.6, 0.4]]);
        let filtered = median_filter_2d(data.view(), (41, 1)).unwrap();
        assert_eq!(filtered.dim(), (2, 2));
    }

    #[test]
    fn test_even_window_rejected() {
        let data = arr2(&[[0.5f32, 0.5]]);
        assert!(median_filter_2d(data.view(), (4, 1)).is_err());
        assert!(median_filter_2d(data.view(), (3, 0)).is_err());
    }
}
