//! Zero-phase smoothing of per-snapshot score curves
//!
//! The curve is filtered forward and backward with a normalized Hann window,
//! after odd extension of `3 * window_len` samples at both ends, with the
//! filter state started at steady state for the first sample. This matches
//! `filtfilt(w, [1], x)` with its default padding.

use crate::error::ChordError;

/// Symmetric Hann window of length `len`
///
/// `w[n] = 0.5 - 0.5 * cos(2 * pi * n / (len - 1))`; a length-1 window is `[1.0]`.
pub fn hann(len: usize) -> Vec<f64> {
    match len {
        0 => vec![],
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f64;
            (0..len)
                .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / denom).cos())
                .collect()
        }
    }
}

/// Hann window scaled to sum to 1
pub fn normalized_hann(len: usize) -> Result<Vec<f64>, ChordError> {
    let mut window = hann(len);
    let sum: f64 = window.iter().sum();
    if sum <= 0.0 {
        return Err(ChordError::InvalidParameter(format!(
            "Hann window of length {} cannot be normalized",
            len
        )));
    }
    for w in window.iter_mut() {
        *w /= sum;
    }
    Ok(window)
}

/// Padding used by [`filtfilt`] for a filter of `taps` coefficients
pub fn filtfilt_padlen(taps: usize) -> usize {
    3 * taps
}

/// Direct-form FIR filter starting from state `zi`
fn lfilter(b: &[f64], x: &[f64], zi: &[f64]) -> Vec<f64> {
    let mut z = zi.to_vec();
    let mut y = Vec::with_capacity(x.len());
    for &xn in x {
        let yn = b[0] * xn + z.first().copied().unwrap_or(0.0);
        for i in 0..z.len() {
            let next = if i + 1 < z.len() { z[i + 1] } else { 0.0 };
            z[i] = b[i + 1] * xn + next;
        }
        y.push(yn);
    }
    y
}

/// Steady-state filter state for a unit step input
fn lfilter_zi(b: &[f64]) -> Vec<f64> {
    (1..b.len()).map(|i| b[i..].iter().sum::<f64>()).collect()
}

/// Zero-phase FIR filtering with odd-extension padding
///
/// # Errors
///
/// Returns `InvalidParameter` if `b` is empty or `x` is not longer than the padding
pub fn filtfilt(b: &[f64], x: &[f64]) -> Result<Vec<f64>, ChordError> {
    if b.is_empty() {
        return Err(ChordError::InvalidParameter("Empty filter".to_string()));
    }
    let padlen = filtfilt_padlen(b.len());
    let n = x.len();
    if n <= padlen {
        return Err(ChordError::InvalidParameter(format!(
            "Signal of length {} is too short for padding {}",
            n, padlen
        )));
    }

    let first = x[0];
    let last = x[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    ext.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=padlen).map(|i| 2.0 * last - x[n - 1 - i]));

    let zi = lfilter_zi(b);
    let scaled = |scale: f64| zi.iter().map(|z| z * scale).collect::<Vec<_>>();

    let forward = lfilter(b, &ext, &scaled(ext[0]));
    let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
    let start = reversed[0];
    reversed = lfilter(b, &reversed, &scaled(start));
    reversed.reverse();

    Ok(reversed[padlen..padlen + n].to_vec())
}

/// Smooth a score curve with a normalized Hann window of length `filter_len`
pub fn smooth_scores(scores: &[f64], filter_len: usize) -> Result<Vec<f64>, ChordError> {
    let window = normalized_hann(filter_len)?;
    filtfilt(&window, scores)
}
