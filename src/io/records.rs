//! Record types stored in stashes
//!
//! Matrices are written as nested row lists (`[[f32; cols]; rows]`).

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::ChordError;

/// Posteriorgram of one track with its frame-level ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPosteriorRecord", into = "RawPosteriorRecord")]
pub struct PosteriorRecord {
    /// (frames x classes) class posteriors
    pub posterior: Array2<f32>,
    /// Ground-truth chord label per frame
    pub chord_labels: Vec<String>,
    /// Optional per-frame duration weights
    pub durations: Option<Vec<f32>>,
}

impl PosteriorRecord {
    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.posterior.nrows()
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.posterior.ncols()
    }
}

#[derive(Serialize, Deserialize)]
struct RawPosteriorRecord {
    posterior: Vec<Vec<f32>>,
    chord_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    durations: Option<Vec<f32>>,
}

impl TryFrom<RawPosteriorRecord> for PosteriorRecord {
    type Error = ChordError;

    fn try_from(raw: RawPosteriorRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            posterior: rows_to_array2(raw.posterior)?,
            chord_labels: raw.chord_labels,
            durations: raw.durations,
        })
    }
}

impl From<PosteriorRecord> for RawPosteriorRecord {
    fn from(record: PosteriorRecord) -> Self {
        Self {
            posterior: array2_to_rows(&record.posterior),
            chord_labels: record.chord_labels,
            durations: record.durations,
        }
    }
}

/// Spectral features of one track with per-frame chord class indices
///
/// Negative indices mark frames without a usable label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChordRecord", into = "RawChordRecord")]
pub struct ChordRecord {
    /// (frames x bins) constant-Q features
    pub cqt: Array2<f32>,
    /// Chord class index per frame
    pub chord_idx: Vec<i64>,
}

#[derive(Serialize, Deserialize)]
struct RawChordRecord {
    cqt: Vec<Vec<f32>>,
    chord_idx: Vec<i64>,
}

impl TryFrom<RawChordRecord> for ChordRecord {
    type Error = ChordError;

    fn try_from(raw: RawChordRecord) -> Result<Self, Self::Error> {
        let cqt = rows_to_array2(raw.cqt)?;
        if cqt.nrows() != raw.chord_idx.len() {
            return Err(ChordError::LengthMismatch(format!(
                "{} feature frames vs {} chord indices",
                cqt.nrows(),
                raw.chord_idx.len()
            )));
        }
        Ok(Self {
            cqt,
            chord_idx: raw.chord_idx,
        })
    }
}

impl From<ChordRecord> for RawChordRecord {
    fn from(record: ChordRecord) -> Self {
        Self {
            cqt: array2_to_rows(&record.cqt),
            chord_idx: record.chord_idx,
        }
    }
}

/// Build a matrix from equally long rows
pub fn rows_to_array2(rows: Vec<Vec<f32>>) -> Result<Array2<f32>, ChordError> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, |r| r.len());
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
        return Err(ChordError::ShapeMismatch(format!(
            "Row {} has {} columns, expected {}",
            i,
            row.len(),
            n_cols
        )));
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((n_rows, n_cols), flat)?)
}

fn array2_to_rows(matrix: &Array2<f32>) -> Vec<Vec<f32>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_rows_to_array2_ragged() {
        let result = rows_to_array2(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(ChordError::ShapeMismatch(_))));
    }

    #[test]
    fn test_posterior_record_json() {
        let json = r#"{"posterior": [[0.1, 0.9], [0.7, 0.3]], "chord_labels": ["A:maj", "N"]}"#;
        let record: PosteriorRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.num_frames(), 2);
        assert_eq!(record.num_classes(), 2);
        assert_eq!(record.posterior, arr2(&[[0.1f32, 0.9], [0.7, 0.3]]));
        assert!(record.durations.is_none());

        let back: PosteriorRecord =
            serde_json::from_value(serde_json::to_value(&record).unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_chord_record_length_checked() {
        let json = r#"{"cqt": [[0.0, 1.0], [1.0, 0.0]], "chord_idx": [3]}"#;
        assert!(serde_json::from_str::<ChordRecord>(json).is_err());
    }
}
