//! Record-level and collection-level estimation

use std::collections::BTreeMap;

use super::EstimationMap;
use crate::decoding::DecodeStrategy;
use crate::error::ChordError;
use crate::io::{PosteriorRecord, Stash};

/// Decode one record and aggregate it against its chord labels
///
/// Uses the record's `durations` as frame weights when present.
///
/// # Errors
///
/// Propagates decoding errors and `LengthMismatch` between the posteriorgram,
/// the labels and the durations.
pub fn estimate_classes(
    record: &PosteriorRecord,
    strategy: &DecodeStrategy,
) -> Result<EstimationMap, ChordError> {
    let decoded = strategy.decode(record.posterior.view())?;
    let mut estimations = EstimationMap::new(record.num_classes());
    estimations.accumulate(&decoded, &record.chord_labels, record.durations.as_deref())?;
    Ok(estimations)
}

/// Estimations gathered over a whole stash
#[derive(Debug, Clone, Default)]
pub struct CollectionEstimates {
    /// Estimation map of every successfully processed record, by record key
    pub per_record: BTreeMap<String, EstimationMap>,

    /// All records merged by label; `None` when no record succeeded
    pub merged: Option<EstimationMap>,

    /// Keys of records that could not be read or processed
    pub skipped: Vec<String>,
}

/// Estimate every record of a stash
///
/// Records that fail to load or decode, or whose class count differs from
/// the first processed record, are logged and skipped.
///
/// # Arguments
///
/// * `stash` - Collection of posterior records
/// * `strategy` - Decoding strategy applied to every record
pub fn estimate_collection(
    stash: &Stash<PosteriorRecord>,
    strategy: &DecodeStrategy,
) -> CollectionEstimates {
    let total = stash.len();
    let mut result = CollectionEstimates::default();

    for (idx, key) in stash.keys().enumerate() {
        let estimated = stash
            .get(key)
            .and_then(|record| estimate_classes(&record, strategy))
            .and_then(|estimations| {
                match result.merged.as_mut() {
                    Some(merged) => merged.merge(&estimations)?,
                    None => result.merged = Some(estimations.clone()),
                }
                Ok(estimations)
            });

        match estimated {
            Ok(estimations) => {
                result.per_record.insert(key.to_string(), estimations);
                log::info!("{:>12} / {:>12}: {}", idx, total, key);
            }
            Err(e) => {
                log::warn!("{:>12} / {:>12}: skipping {} ({})", idx, total, key, e);
                result.skipped.push(key.to_string());
            }
        }
    }

    log::debug!(
        "Estimated {} of {} records ({} skipped)",
        result.per_record.len(),
        total,
        result.skipped.len()
    );

    result
}
