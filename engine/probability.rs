//! # Ordered-categorical probability calculator
//!
//! Maps a scalar linear predictor and `K - 1` ascending cutpoints onto a
//! `K`-level probability distribution through a cumulative link:
//!
//! - `P(Y = 1) = F(tau_1 - mu)`
//! - `P(Y = k) = F(tau_k - mu) - F(tau_{k-1} - mu)` for `1 < k < K`
//! - `P(Y = K) = 1 - F(tau_{K-1} - mu)`
//!
//! where `F` is the logistic CDF (`logit` link) or the standard normal CDF
//! (`probit` link). The model has no intercept; the cutpoints absorb it.

use crate::features::FeatureVector;
use crate::model::LinkFunction;
use crate::types::ProbabilityResult;
use ndarray::Array1;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Logistic inputs are clamped to this magnitude before `exp()`.
const LOGISTIC_CLAMP: f64 = 500.0;

/// Beyond six standard deviations the normal CDF is 0 or 1 to double precision.
const NORMAL_CLAMP: f64 = 6.0;

/// Tolerance used by the advisory range and sum checks.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A model-definition defect detected while evaluating the ordered probabilities.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ProbabilityError {
    #[error("An ordered model needs at least 2 outcome levels, but {0} were declared.")]
    InsufficientLevels(usize),
    #[error("A {levels}-level model needs {expected} thresholds, but {found} were supplied.")]
    ThresholdCountMismatch {
        levels: usize,
        expected: usize,
        found: usize,
    },
    #[error("Threshold {index} is not a finite number ({value}).")]
    NonFiniteThreshold { index: usize, value: f64 },
    #[error("The linear predictor evaluated to a non-finite value ({0}).")]
    NonFinitePredictor(f64),
}

/// Standard logistic CDF, `1 / (1 + e^-z)`.
pub fn logistic_cdf(z: f64) -> f64 {
    let z = z.clamp(-LOGISTIC_CLAMP, LOGISTIC_CLAMP);
    1.0 / (1.0 + (-z).exp())
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 error function.
/// Absolute error is below 1.5e-7 everywhere.
pub fn normal_cdf(z: f64) -> f64 {
    let z = z.clamp(-NORMAL_CLAMP, NORMAL_CLAMP);
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

impl LinkFunction {
    /// The cumulative distribution function behind this link.
    pub fn cdf(self, z: f64) -> f64 {
        match self {
            LinkFunction::Logit => logistic_cdf(z),
            LinkFunction::Probit => normal_cdf(z),
        }
    }
}

/// `sum(coefficient[v] * features[v])`; a covariate missing from `features`
/// contributes nothing.
pub fn linear_predictor(features: &FeatureVector, coefficients: &BTreeMap<String, f64>) -> f64 {
    coefficients
        .iter()
        .map(|(name, weight)| weight * features.value_or_zero(name))
        .sum()
}

/// Human-readable names for the outcome levels of a `levels`-category model.
pub fn level_labels(levels: usize) -> Vec<String> {
    match levels {
        3 => ["Do Less", "About the Same", "Do More"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        5 => [
            "Very Unlikely",
            "Somewhat Unlikely",
            "Neutral",
            "Somewhat Likely",
            "Very Likely",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        k => (1..=k).map(|i| format!("Level {i}")).collect(),
    }
}

/// Computes the distribution over `levels` ordered outcomes.
///
/// `sorted_thresholds` must be ascending; callers obtain them from
/// [`crate::model::OrderedModel`], which sorts on construction. The range and
/// sum checks on the output are advisory and only logged.
pub fn ordered_probabilities(
    mu: f64,
    sorted_thresholds: &[f64],
    levels: usize,
    link: LinkFunction,
) -> Result<ProbabilityResult, ProbabilityError> {
    if levels < 2 {
        return Err(ProbabilityError::InsufficientLevels(levels));
    }
    if sorted_thresholds.len() != levels - 1 {
        return Err(ProbabilityError::ThresholdCountMismatch {
            levels,
            expected: levels - 1,
            found: sorted_thresholds.len(),
        });
    }
    if let Some((index, &value)) = sorted_thresholds
        .iter()
        .enumerate()
        .find(|(_, t)| !t.is_finite())
    {
        return Err(ProbabilityError::NonFiniteThreshold { index, value });
    }
    if !mu.is_finite() {
        return Err(ProbabilityError::NonFinitePredictor(mu));
    }

    let cumulative: Vec<f64> = sorted_thresholds
        .iter()
        .map(|tau| link.cdf(tau - mu))
        .collect();

    let probabilities = Array1::from_shape_fn(levels, |k| {
        let p = if k == 0 {
            cumulative[0]
        } else if k == levels - 1 {
            1.0 - cumulative[levels - 2]
        } else {
            cumulative[k] - cumulative[k - 1]
        };
        if !(-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(&p) {
            log::warn!("Level {} probability {p} is outside [0, 1] before clamping", k + 1);
        }
        p.clamp(0.0, 1.0)
    });

    let total = probabilities.sum();
    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        log::warn!(
            "Ordered probabilities sum to {total:.9} instead of 1 (mu = {mu}, link = {link:?})"
        );
    }

    Ok(ProbabilityResult {
        probabilities,
        labels: level_labels(levels),
    })
}
