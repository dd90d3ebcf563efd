//! Random minibatches of labelled feature windows
//!
//! Each observation is a `time_dim`-frame window of constant-Q features
//! centered on a labelled frame of a randomly chosen record, zero padded
//! where the window runs past the record edges.

use ndarray::{s, Array2, Array4, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ChordError;
use crate::io::{ChordRecord, Stash};

/// One minibatch of validation data
#[derive(Debug, Clone)]
pub struct ValidationBatch {
    /// Network input of shape (batch, 1, time_dim, bins)
    pub inputs: ArrayD<f32>,
    /// Chord class index of the center frame of each window
    pub labels: Vec<usize>,
}

impl ValidationBatch {
    /// Number of observations
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the batch holds no observations
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

struct LabelledTrack {
    cqt: Array2<f32>,
    chord_idx: Vec<i64>,
    valid_frames: Vec<usize>,
}

/// Endless sampler of validation minibatches over a stash of chord records
pub struct ChordStream {
    tracks: Vec<LabelledTrack>,
    time_dim: usize,
    batch_size: usize,
    num_bins: usize,
    rng: StdRng,
}

impl ChordStream {
    /// Load every usable record of `stash`
    ///
    /// Records that fail to load, carry no labelled frame, or whose bin
    /// count differs from the first usable record are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `time_dim` or `batch_size` is zero, or
    /// if no record has a labelled frame.
    pub fn new(
        stash: &Stash<ChordRecord>,
        time_dim: usize,
        batch_size: usize,
        seed: u64,
    ) -> Result<Self, ChordError> {
        if time_dim == 0 || batch_size == 0 {
            return Err(ChordError::InvalidParameter(format!(
                "time_dim ({}) and batch_size ({}) must be positive",
                time_dim, batch_size
            )));
        }

        let mut tracks = Vec::new();
        let mut num_bins = None;
        for key in stash.keys() {
            let record = match stash.get(key) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Skipping {}: {}", key, e);
                    continue;
                }
            };

            let bins = record.cqt.ncols();
            match num_bins {
                Some(expected) if expected != bins => {
                    log::warn!("Skipping {}: {} bins, expected {}", key, bins, expected);
                    continue;
                }
                _ => {}
            }

            let valid_frames: Vec<usize> = record
                .chord_idx
                .iter()
                .enumerate()
                .filter(|(_, idx)| **idx >= 0)
                .map(|(frame, _)| frame)
                .collect();
            if valid_frames.is_empty() {
                log::debug!("Skipping {}: no labelled frames", key);
                continue;
            }

            num_bins = Some(bins);
            tracks.push(LabelledTrack {
                cqt: record.cqt,
                chord_idx: record.chord_idx,
                valid_frames,
            });
        }

        let num_bins = num_bins.ok_or_else(|| {
            ChordError::InvalidParameter("No record with labelled frames".to_string())
        })?;

        log::debug!(
            "Validation stream over {} records, window {} x {}",
            tracks.len(),
            time_dim,
            num_bins
        );

        Ok(Self {
            tracks,
            time_dim,
            batch_size,
            num_bins,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Number of usable records
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Feature bins per frame
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Draw the next minibatch
    pub fn next_batch(&mut self) -> ValidationBatch {
        let mut inputs = Array4::<f32>::zeros((self.batch_size, 1, self.time_dim, self.num_bins));
        let mut labels = Vec::with_capacity(self.batch_size);
        let half = (self.time_dim / 2) as isize;

        for n in 0..self.batch_size {
            let track = &self.tracks[self.rng.random_range(0..self.tracks.len())];
            let center =
                track.valid_frames[self.rng.random_range(0..track.valid_frames.len())];

            let num_frames = track.cqt.nrows() as isize;
            for t in 0..self.time_dim {
                let src = center as isize - half + t as isize;
                if (0..num_frames).contains(&src) {
                    inputs
                        .slice_mut(s![n, 0, t, ..])
                        .assign(&track.cqt.row(src as usize));
                }
            }
            // valid_frames only holds non-negative indices
            labels.push(track.chord_idx[center] as usize);
        }

        ValidationBatch {
            inputs: inputs.into_dyn(),
            labels,
        }
    }

    /// Draw `count` minibatches
    pub fn draw_batches(&mut self, count: usize) -> Vec<ValidationBatch> {
        (0..count).map(|_| self.next_batch()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp_record(frames: usize, bins: usize, chord_idx: Vec<i64>) -> ChordRecord {
        ChordRecord {
            cqt: Array2::from_shape_fn((frames, bins), |(t, b)| (t * 10 + b) as f32 + 1.0),
            chord_idx,
        }
    }

    #[test]
    fn test_batch_shape_and_labels() {
        let mut stash = Stash::new();
        stash
            .insert("a", &ramp_record(6, 3, vec![-1, 2, 2, -1, 5, -1]))
            .unwrap();
        let mut stream = ChordStream::new(&stash, 3, 8, 7).unwrap();

        let batch = stream.next_batch();
        assert_eq!(batch.inputs.shape(), &[8, 1, 3, 3]);
        assert_eq!(batch.len(), 8);
        for &label in &batch.labels {
            assert!(label == 2 || label == 5);
        }
    }

    #[test]
    fn test_window_is_centered_and_zero_padded() {
        let mut stash = Stash::new();
        // Only frame 0 is labelled: the window must start before the record
        stash
            .insert("a", &ramp_record(4, 2, vec![3, -1, -1, -1]))
            .unwrap();
        let mut stream = ChordStream::new(&stash, 5, 1, 0).unwrap();

        let batch = stream.next_batch();
        assert_eq!(batch.labels, vec![3]);
        let window = batch
            .inputs
            .slice(s![0, 0, .., ..])
            .into_dimensionality::<ndarray::Ix2>()
            .unwrap();
        assert_eq!(window.row(0).to_vec(), vec![0.0, 0.0]);
        assert_eq!(window.row(1).to_vec(), vec![0.0, 0.0]);
        assert_eq!(window.row(2).to_vec(), vec![1.0, 2.0]);
        assert_eq!(window.row(3).to_vec(), vec![11.0, 12.0]);
        assert_eq!(window.row(4).to_vec(), vec![21.0, 22.0]);
    }

    #[test]
    fn test_skips_unlabelled_and_mismatched_records() {
        let mut stash = Stash::new();
        stash.insert("a", &ramp_record(3, 2, vec![0, 1, 0])).unwrap();
        stash.insert("b", &ramp_record(3, 2, vec![-1, -1, -1])).unwrap();
        stash.insert("c", &ramp_record(3, 4, vec![0, 0, 0])).unwrap();

        let stream = ChordStream::new(&stash, 1, 2, 0).unwrap();
        assert_eq!(stream.num_tracks(), 1);
    }

    #[test]
    fn test_no_labelled_frames() {
        let mut stash = Stash::new();
        stash.insert("a", &ramp_record(3, 2, vec![-1, -1, -1])).unwrap();
        assert!(matches!(
            ChordStream::new(&stash, 1, 2, 0),
            Err(ChordError::InvalidParameter(_))
        ));
        assert!(ChordStream::new(&Stash::new(), 0, 2, 0).is_err());
    }

    #[test]
    fn test_seed_is_deterministic() {
        let mut stash = Stash::new();
        stash
            .insert("a", &ramp_record(20, 2, (0..20).map(|i| i % 4).collect()))
            .unwrap();
        stash
            .insert("b", &ramp_record(15, 2, (0..15).map(|i| i % 3).collect()))
            .unwrap();

        let first = ChordStream::new(&stash, 3, 16, 42).unwrap().draw_batches(3);
        let second = ChordStream::new(&stash, 3, 16, 42).unwrap().draw_batches(3);
        assert_eq!(first.len(), 3);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.labels, b.labels);
            assert_eq!(a.inputs, b.inputs);
        }
    }
}
