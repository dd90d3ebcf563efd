//! Estimation aggregation
//!
//! Accumulates, for every ground-truth chord label, a dense histogram over the
//! decoded class indices of the frames carrying that label. Frames can be
//! weighted (e.g. by duration); the histogram then holds summed weights.

pub mod collection;

pub use collection::{estimate_classes, estimate_collection, CollectionEstimates};

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::ChordError;

/// Weighted class-count histograms keyed by ground-truth label
///
/// Grows monotonically: labels are only ever added and counts only increase.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EstimationMap {
    num_classes: usize,
    counts: BTreeMap<String, Vec<f64>>,
}

impl EstimationMap {
    /// Create an empty map for `num_classes` decoded classes
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: BTreeMap::new(),
        }
    }

    /// Number of decoded classes (length of every count vector)
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Count vector for a label, if the label has been seen
    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.counts.get(label).map(|v| v.as_slice())
    }

    /// Number of distinct labels
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True when no frame has been accumulated
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over (label, counts) in label order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.counts.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Sum of all accumulated weights
    pub fn total_weight(&self) -> f64 {
        self.counts.values().flat_map(|v| v.iter()).sum()
    }

    /// Add one decoded sequence to the map
    ///
    /// For each frame `i`, adds `weights[i]` (or 1 when `weights` is `None`)
    /// to `counts[labels[i]][decoded[i]]`, creating a zero vector for labels
    /// seen for the first time. Nothing is modified when an error is returned.
    ///
    /// # Errors
    ///
    /// - `LengthMismatch` if `decoded`, `labels` and `weights` differ in length
    /// - `InvalidParameter` if a decoded index is out of range or a weight is
    ///   negative or NaN
    pub fn accumulate<S: AsRef<str>>(
        &mut self,
        decoded: &[usize],
        labels: &[S],
        weights: Option<&[f32]>,
    ) -> Result<(), ChordError> {
        if decoded.len() != labels.len() {
            return Err(ChordError::LengthMismatch(format!(
                "{} decoded frames vs {} labels",
                decoded.len(),
                labels.len()
            )));
        }
        if let Some(w) = weights {
            if w.len() != decoded.len() {
                return Err(ChordError::LengthMismatch(format!(
                    "{} decoded frames vs {} weights",
                    decoded.len(),
                    w.len()
                )));
            }
            if let Some(bad) = w.iter().find(|&&x| !(x >= 0.0)) {
                return Err(ChordError::InvalidParameter(format!(
                    "Frame weights must be non-negative, got {}",
                    bad
                )));
            }
        }
        if let Some(&idx) = decoded.iter().find(|&&idx| idx >= self.num_classes) {
            return Err(ChordError::InvalidParameter(format!(
                "Decoded index {} out of range for {} classes",
                idx, self.num_classes
            )));
        }

        let num_classes = self.num_classes;
        for (i, (&idx, label)) in decoded.iter().zip(labels.iter()).enumerate() {
            let w = weights.map_or(1.0, |w| w[i] as f64);
            let counts = self
                .counts
                .entry(label.as_ref().to_string())
                .or_insert_with(|| vec![0.0; num_classes]);
            counts[idx] += w;
        }

        Ok(())
    }

    /// Add every count of `other` into this map
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the two maps track a different number of classes
    pub fn merge(&mut self, other: &EstimationMap) -> Result<(), ChordError> {
        if other.num_classes != self.num_classes {
            return Err(ChordError::ShapeMismatch(format!(
                "Cannot merge estimations over {} classes into {} classes",
                other.num_classes, self.num_classes
            )));
        }
        for (label, theirs) in &other.counts {
            let ours = self
                .counts
                .entry(label.clone())
                .or_insert_with(|| vec![0.0; other.num_classes]);
            for (a, b) in ours.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        Ok(())
    }
}

/// Aggregate one decoded sequence into a fresh estimation map
///
/// # Arguments
///
/// * `decoded` - Decoded class index per frame
/// * `labels` - Ground-truth chord label per frame
/// * `weights` - Optional per-frame weight (defaults to 1)
/// * `num_classes` - Number of classes of the posteriorgram
///
/// # Example
///
/// ```
/// use stratum_chords::aggregation::aggregate;
///
/// let map = aggregate(&[0, 1, 0], &["A", "B", "A"], None, 2)?;
/// assert_eq!(map.get("A"), Some(&[2.0, 0.0][..]));
/// assert_eq!(map.get("B"), Some(&[0.0, 1.0][..]));
/// # Ok::<(), stratum_chords::ChordError>(())
/// ```
pub fn aggregate<S: AsRef<str>>(
    decoded: &[usize],
    labels: &[S],
    weights: Option<&[f32]>,
    num_classes: usize,
) -> Result<EstimationMap, ChordError> {
    let mut map = EstimationMap::new(num_classes);
    map.accumulate(decoded, labels, weights)?;
    Ok(map)
}

/// Weight vector written with integral values as JSON integers
struct WeightVec<'a>(&'a [f64]);

impl Serialize for WeightVec<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for &v in self.0 {
            if v.fract() == 0.0 && v.abs() < 9.0e15 {
                seq.serialize_element(&(v as i64))?;
            } else {
                seq.serialize_element(&v)?;
            }
        }
        seq.end()
    }
}

impl Serialize for EstimationMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (label, counts) in &self.counts {
            map.serialize_entry(label, &WeightVec(counts))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_unweighted() {
        let map = aggregate(&[0, 1, 0], &["A", "B", "A"], None, 2).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("A").unwrap(), &[2.0, 0.0]);
        assert_eq!(map.get("B").unwrap(), &[0.0, 1.0]);
        assert_eq!(map.total_weight(), 3.0);
    }

    #[test]
    fn test_aggregate_weighted() {
        let weights = [0.5f32, 2.0, 1.5];
        let map = aggregate(&[2, 2, 0], &["C:maj", "C:maj", "N"], Some(&weights), 3).unwrap();
        assert_eq!(map.get("C:maj").unwrap(), &[0.0, 0.0, 2.5]);
        assert_eq!(map.get("N").unwrap(), &[1.5, 0.0, 0.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let result = aggregate(&[0, 1], &["A"], None, 2);
        assert!(matches!(result, Err(ChordError::LengthMismatch(_))));

        let result = aggregate(&[0, 1], &["A", "B"], Some(&[1.0]), 2);
        assert!(matches!(result, Err(ChordError::LengthMismatch(_))));
    }

    #[test]
    fn test_out_of_range_index_leaves_map_untouched() {
        let mut map = aggregate(&[0], &["A"], None, 2).unwrap();
        let before = map.clone();
        let result = map.accumulate(&[1, 5], &["A", "B"], None);
        assert!(matches!(result, Err(ChordError::InvalidParameter(_))));
        assert_eq!(map, before);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let result = aggregate(&[0], &["A"], Some(&[-1.0]), 2);
        assert!(matches!(result, Err(ChordError::InvalidParameter(_))));
    }

    #[test]
    fn test_accumulation_is_order_independent() {
        let batches: Vec<(Vec<usize>, Vec<&str>)> = vec![
            (vec![0, 1, 1], vec!["A", "B", "B"]),
            (vec![2, 2], vec!["C", "A"]),
            (vec![1, 0, 2, 0], vec!["B", "A", "C", "N"]),
        ];

        let mut forward = EstimationMap::new(3);
        for (decoded, labels) in &batches {
            forward.accumulate(decoded, labels, None).unwrap();
        }

        let mut backward = EstimationMap::new(3);
        for (decoded, labels) in batches.iter().rev() {
            let partial = aggregate(decoded, labels, None, 3).unwrap();
            backward.merge(&partial).unwrap();
        }

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_merge_class_count_mismatch() {
        let mut a = EstimationMap::new(2);
        let b = EstimationMap::new(3);
        assert!(matches!(a.merge(&b), Err(ChordError::ShapeMismatch(_))));
    }

    #[test]
    fn test_json_integers_and_fractions() {
        let map = aggregate(&[0, 1], &["A", "A"], Some(&[1.0, 0.5]), 3).unwrap();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"A":[1,0.5,0]}"#);
    }
}
