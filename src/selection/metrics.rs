//! Classification scores for checkpoint ranking
//!
//! Precision, recall and F1 are macro-averaged over every class appearing in
//! either the true or the predicted labels. A class with no predicted (or no
//! true) frames contributes 0 to the precision (or recall) average.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ChordError;

/// Score used to rank candidate snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Macro precision
    Precision,
    /// Macro recall
    Recall,
    /// Macro F1
    F1,
}

impl FromStr for Metric {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            "f1" => Ok(Metric::F1),
            other => Err(ChordError::InvalidParameter(format!(
                "Unknown metric '{}', expected precision, recall or f1",
                other
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::F1 => "f1",
        };
        f.write_str(name)
    }
}

/// Precision / recall / F1 triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrfScores {
    /// Macro precision
    pub precision: f64,
    /// Macro recall
    pub recall: f64,
    /// Macro F1
    pub f1: f64,
}

impl PrfScores {
    /// Value of the requested metric
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Precision => self.precision,
            Metric::Recall => self.recall,
            Metric::F1 => self.f1,
        }
    }
}

impl fmt::Display for PrfScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}/{:.4}/{:.4}", self.precision, self.recall, self.f1)
    }
}

/// Macro-averaged precision, recall and F1
///
/// # Errors
///
/// Returns `LengthMismatch` if the label sequences differ in length
pub fn precision_recall_f1(y_true: &[usize], y_pred: &[usize]) -> Result<PrfScores, ChordError> {
    if y_true.len() != y_pred.len() {
        return Err(ChordError::LengthMismatch(format!(
            "{} true labels vs {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }

    let classes: BTreeSet<usize> = y_true.iter().chain(y_pred.iter()).copied().collect();
    if classes.is_empty() {
        return Ok(PrfScores {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
        });
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;
    let mut f1_sum = 0.0;

    for &class in &classes {
        let mut tp = 0usize;
        let mut n_pred = 0usize;
        let mut n_true = 0usize;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if p == class {
                n_pred += 1;
                if t == class {
                    tp += 1;
                }
            }
            if t == class {
                n_true += 1;
            }
        }

        let precision = ratio(tp, n_pred);
        let recall = ratio(tp, n_true);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        precision_sum += precision;
        recall_sum += recall;
        f1_sum += f1;
    }

    let n = classes.len() as f64;
    Ok(PrfScores {
        precision: precision_sum / n,
        recall: recall_sum / n,
        f1: f1_sum / n,
    })
}
