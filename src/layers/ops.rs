//! Numeric forward kernels shared by the layer types

use ndarray::{s, Array1, Array2, Array4, ArrayD, ArrayView2, ArrayView4, Axis, Ix4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ChordError;

/// Border handling for 2D convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderMode {
    /// Only positions where the kernel fits entirely: `d - k + 1`
    #[default]
    Valid,
    /// Every position with any overlap: `d + k - 1`
    Full,
}

impl BorderMode {
    /// Convolution output length along one axis, before pooling
    pub fn conv_len(&self, input: usize, kernel: usize) -> Result<usize, ChordError> {
        match self {
            BorderMode::Valid if kernel > input => Err(ChordError::ShapeMismatch(format!(
                "Kernel of {} exceeds input of {} in valid mode",
                kernel, input
            ))),
            BorderMode::Valid => Ok(input - kernel + 1),
            BorderMode::Full => Ok(input + kernel - 1),
        }
    }
}

/// Flatten `(N, d0, d1, ...)` to `(N, d0 * d1 * ...)`
pub fn flatten_2d(x: &ArrayD<f32>) -> Result<Array2<f32>, ChordError> {
    let Some((&n, rest)) = x.shape().split_first() else {
        return Err(ChordError::ShapeMismatch(
            "Cannot flatten a scalar".to_string(),
        ));
    };
    let cols: usize = rest.iter().product();
    Ok(x.to_shape((n, cols))?.to_owned())
}

/// View a tensor as `(N, C, H, W)`
pub fn as_4d(x: &ArrayD<f32>) -> Result<ArrayView4<'_, f32>, ChordError> {
    x.view().into_dimensionality::<Ix4>().map_err(|_| {
        ChordError::ShapeMismatch(format!(
            "Expected a (batch, maps, rows, cols) input, got {:?}",
            x.shape()
        ))
    })
}

/// 2D convolution of `(N, C, H, W)` inputs with `(K, C, kh, kw)` kernels
///
/// Kernels are flipped along both spatial axes (true convolution).
pub fn conv2d(
    x: ArrayView4<f32>,
    w: ArrayView4<f32>,
    mode: BorderMode,
) -> Result<Array4<f32>, ChordError> {
    let (n, c, h, wd) = x.dim();
    let (k, wc, kh, kw) = w.dim();
    if c != wc {
        return Err(ChordError::ShapeMismatch(format!(
            "Input has {} maps, kernels expect {}",
            c, wc
        )));
    }
    let out_h = mode.conv_len(h, kh)?;
    let out_w = mode.conv_len(wd, kw)?;
    let (off_h, off_w) = match mode {
        BorderMode::Valid => (kh - 1, kw - 1),
        BorderMode::Full => (0, 0),
    };

    let mut out = Array4::<f32>::zeros((n, k, out_h, out_w));
    for b in 0..n {
        for m in 0..k {
            for i in 0..out_h {
                for j in 0..out_w {
                    let mut acc = 0.0f32;
                    for ch in 0..c {
                        for a in 0..kh {
                            let Some(row) = (i + off_h).checked_sub(a).filter(|v| *v < h) else {
                                continue;
                            };
                            for q in 0..kw {
                                let Some(col) = (j + off_w).checked_sub(q).filter(|v| *v < wd)
                                else {
                                    continue;
                                };
                                acc += x[[b, ch, row, col]] * w[[m, ch, a, q]];
                            }
                        }
                    }
                    out[[b, m, i, j]] = acc;
                }
            }
        }
    }
    Ok(out)
}

/// Non-overlapping max pooling over the last two axes
///
/// Trailing rows and columns that do not fill a whole window are dropped.
pub fn max_pool2d(x: &Array4<f32>, pool: (usize, usize)) -> Result<Array4<f32>, ChordError> {
    let (ph, pw) = pool;
    if ph == 0 || pw == 0 {
        return Err(ChordError::InvalidParameter(format!(
            "Pool shape {:?} must be positive",
            pool
        )));
    }
    if pool == (1, 1) {
        return Ok(x.clone());
    }

    let (n, k, h, w) = x.dim();
    let (out_h, out_w) = (h / ph, w / pw);
    let mut out = Array4::<f32>::zeros((n, k, out_h, out_w));
    for ((b, m, i, j), v) in out.indexed_iter_mut() {
        let window = x.slice(s![b, m, i * ph..(i + 1) * ph, j * pw..(j + 1) * pw]);
        *v = window.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    }
    Ok(out)
}

/// Row-wise softmax
pub fn softmax_rows(x: ArrayView2<f32>) -> Array2<f32> {
    let mut out = x.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
    out
}

/// Dropout mask of length `len`
///
/// Each unit is kept with probability `1 - rate`, and kept units are scaled
/// by `rate + 0.5`.
pub fn dropout_mask<R: Rng>(
    len: usize,
    rate: f32,
    rng: &mut R,
) -> Result<Array1<f32>, ChordError> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(ChordError::InvalidParameter(format!(
            "Dropout rate {} outside [0, 1]",
            rate
        )));
    }
    let keep = f64::from(1.0 - rate);
    let scale = rate + 0.5;
    Ok(Array1::from_shape_fn(len, |_| {
        if rng.random_bool(keep) {
            scale
        } else {
            0.0
        }
    }))
}
