//! Declarative per-activity metadata.
//!
//! Some activities only make sense for a sub-population (work trips for the
//! employed), and some report a collapsed outcome scale. Both are data
//! attached to the activity's model, so the batch loop stays generic.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rows::SurveyRow;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort: Option<CohortPredicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationRule>,
}

impl ActivityRules {
    pub fn is_empty(&self) -> bool {
        self.cohort.is_none() && self.aggregation.is_none()
    }
}

/// Which respondents an activity's effect is defined for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CohortPredicate {
    /// The field is numeric and equal to one of `values`.
    OneOf { field: String, values: Vec<f64> },
    /// The field is numeric and within `[min, max]`.
    Between { field: String, min: f64, max: f64 },
}

impl CohortPredicate {
    pub fn matches(&self, row: &SurveyRow) -> bool {
        match self {
            CohortPredicate::OneOf { field, values } => row
                .numeric(field)
                .is_some_and(|v| values.iter().any(|allowed| (v - allowed).abs() < 1e-9)),
            CohortPredicate::Between { field, min, max } => row
                .numeric(field)
                .is_some_and(|v| v >= *min && v <= *max),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            CohortPredicate::OneOf { field, .. } | CohortPredicate::Between { field, .. } => field,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum AggregationError {
    #[error("Cannot split {levels} levels after level {split_at}; both groups must be non-empty.")]
    InvalidSplit { levels: usize, split_at: usize },
    #[error("Aggregation inputs disagree in length ({control}, {treatment}, {ate}, {labels}).")]
    LengthMismatch {
        control: usize,
        treatment: usize,
        ate: usize,
        labels: usize,
    },
}

fn default_split_at() -> usize {
    3
}

fn default_binary_labels() -> [String; 2] {
    ["Unlikely".to_string(), "Likely".to_string()]
}

/// How an activity's outcome scale is reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregationRule {
    /// Levels `1..=split_at` are summed into the first label, the rest into
    /// the second. The default turns a 5-point agreement scale into
    /// unlikely (bottom three) versus likely (top two).
    Binary {
        #[serde(default = "default_split_at")]
        split_at: usize,
        #[serde(default = "default_binary_labels")]
        labels: [String; 2],
    },
}

impl Default for AggregationRule {
    fn default() -> Self {
        AggregationRule::Binary {
            split_at: default_split_at(),
            labels: default_binary_labels(),
        }
    }
}

/// Control, treatment, and effect vectors with their level labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelTable {
    pub control: Array1<f64>,
    pub treatment: Array1<f64>,
    pub ate: Array1<f64>,
    pub labels: Vec<String>,
}

impl AggregationRule {
    /// Applies the same collapse to all three vectors and the labels.
    pub fn apply(&self, table: &LevelTable) -> Result<LevelTable, AggregationError> {
        let levels = table.labels.len();
        if table.control.len() != levels || table.treatment.len() != levels || table.ate.len() != levels
        {
            return Err(AggregationError::LengthMismatch {
                control: table.control.len(),
                treatment: table.treatment.len(),
                ate: table.ate.len(),
                labels: levels,
            });
        }

        match self {
            AggregationRule::Binary { split_at, labels } => {
                let split_at = *split_at;
                if split_at == 0 || split_at >= levels {
                    return Err(AggregationError::InvalidSplit { levels, split_at });
                }
                let collapse = |values: &Array1<f64>| {
                    let lower: f64 = values.iter().take(split_at).sum();
                    let upper: f64 = values.iter().skip(split_at).sum();
                    Array1::from_vec(vec![lower, upper])
                };
                Ok(LevelTable {
                    control: collapse(&table.control),
                    treatment: collapse(&table.treatment),
                    ate: collapse(&table.ate),
                    labels: labels.to_vec(),
                })
            }
        }
    }
}
