use crate::model::ModelError;
use crate::probability::ProbabilityError;
use crate::rules::{AggregationError, LevelTable};
use ndarray::Array1;
use serde::Serialize;
use thiserror::Error;

/// A predicted distribution over an ordered outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityResult {
    pub probabilities: Array1<f64>,
    pub labels: Vec<String>,
}

/// Why an activity produced no effect estimate.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum AteFailure {
    #[error("Treatment covariate '{covariate}' is not one of the model's variables.")]
    TreatmentNotInModel { covariate: String },
    #[error("No rows satisfy the cohort restriction on field '{field}'.")]
    EmptyCohort { field: String },
    #[error("No rows are complete cases for the model's covariates ({cohort_rows} rows in cohort).")]
    NoCompleteCases { cohort_rows: usize },
    #[error("Model definition error: {0}")]
    Model(#[from] ModelError),
    #[error("Probability calculation failed: {0}")]
    Probability(#[from] ProbabilityError),
    #[error("Effects sum to {sum:e}, outside the conservation tolerance of {tolerance:e}.")]
    ConservationViolated { sum: f64, tolerance: f64 },
    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// The estimated effect for one activity.
///
/// An invalid result carries empty vectors; `failure` says why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AteResult {
    pub activity: String,
    pub control: Array1<f64>,
    pub treatment: Array1<f64>,
    pub ate: Array1<f64>,
    pub labels: Vec<String>,
    pub conservation_sum: f64,
    pub is_valid: bool,
    pub failure: Option<AteFailure>,
    /// Rows that survived cohort restriction and listwise deletion.
    pub complete_cases: usize,
    pub unresolved_covariates: Vec<String>,
}

impl AteResult {
    pub fn valid(
        activity: &str,
        table: LevelTable,
        complete_cases: usize,
        unresolved_covariates: Vec<String>,
    ) -> Self {
        let conservation_sum = table.ate.sum();
        Self {
            activity: activity.to_string(),
            control: table.control,
            treatment: table.treatment,
            ate: table.ate,
            labels: table.labels,
            conservation_sum,
            is_valid: true,
            failure: None,
            complete_cases,
            unresolved_covariates,
        }
    }

    pub fn invalid(activity: &str, failure: AteFailure) -> Self {
        Self {
            activity: activity.to_string(),
            control: Array1::zeros(0),
            treatment: Array1::zeros(0),
            ate: Array1::zeros(0),
            labels: Vec::new(),
            conservation_sum: 0.0,
            is_valid: false,
            failure: Some(failure),
            complete_cases: 0,
            unresolved_covariates: Vec::new(),
        }
    }

    /// Largest absolute per-level effect; 0 for invalid results.
    pub fn max_abs_effect(&self) -> f64 {
        self.ate.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }
}
