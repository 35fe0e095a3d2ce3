//! # Per-activity ATE pipeline and batch orchestration
//!
//! For each activity the pipeline estimates the effect "at the mean": every
//! covariate except the treatment is held at its weighted mean over the
//! activity's complete cases, and the predicted distributions for the control
//! and treatment settings are differenced level by level.
//!
//! 1. Cohort restriction (optional, from the activity's rules).
//! 2. Complete-case filtering over the model's covariates.
//! 3. Mean imputation over the complete cases.
//! 4. Control and treatment feature vectors.
//! 5. Ordered probabilities for both vectors.
//! 6. Elementwise difference.
//! 7. Conservation and range check.
//! 8. Optional aggregation of the outcome scale.
//!
//! Failure at any step invalidates that activity only. The batch always
//! returns one result per configured activity.

use crate::features::{TreatmentContrast, build_feature_vectors};
use crate::imputation::{
    DEFAULT_WEIGHT_FIELDS, ImputationContext, InteractionCatalog, complete_cases, impute_means,
    required_covariates,
};
use crate::model::{ModelCollection, ModelSpec, OrderedModel};
use crate::rows::SurveyRow;
use crate::rules::LevelTable;
use crate::types::{AteFailure, AteResult};
use crate::validate::{ValidationError, ensure_valid};
use std::cmp::Ordering;

/// Default bound on `|sum(ate)|`. Each distribution sums to 1, so anything
/// larger means a defective model or arithmetic fault.
pub const CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Engine settings that are not part of the treatment contrast.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub interactions: InteractionCatalog,
    pub weight_fields: Vec<String>,
    pub conservation_tolerance: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            interactions: InteractionCatalog::default(),
            weight_fields: DEFAULT_WEIGHT_FIELDS.iter().map(|s| s.to_string()).collect(),
            conservation_tolerance: CONSERVATION_TOLERANCE,
        }
    }
}

/// Effects for every activity with default [`EngineOptions`].
///
/// Call only after [`crate::validate::validate_model_data`] has returned true.
pub fn compute_ates(
    models: &ModelCollection,
    rows: &[SurveyRow],
    contrast: &TreatmentContrast,
) -> Vec<AteResult> {
    compute_ates_with(models, rows, contrast, &EngineOptions::default())
}

/// Effects for every activity, in collection order. Never fails as a whole.
pub fn compute_ates_with(
    models: &ModelCollection,
    rows: &[SurveyRow],
    contrast: &TreatmentContrast,
    options: &EngineOptions,
) -> Vec<AteResult> {
    log::info!(
        "Computing effects of '{}' ({} -> {}) for {} activities over {} rows",
        contrast.covariate,
        contrast.control_value,
        contrast.treatment_value,
        models.len(),
        rows.len()
    );

    let results: Vec<AteResult> = models
        .iter()
        .map(|(activity, spec)| compute_activity(activity, spec, rows, contrast, options))
        .collect();

    let valid = results.iter().filter(|r| r.is_valid).count();
    log::info!("{valid} of {} activities produced valid effects", results.len());
    results
}

/// Validates first and computes only for a sound collection, so structural
/// unavailability is reported once instead of as a batch of empty results.
pub fn run_scenario(
    models: &ModelCollection,
    rows: &[SurveyRow],
    contrast: &TreatmentContrast,
    options: &EngineOptions,
) -> Result<Vec<AteResult>, ValidationError> {
    ensure_valid(models)?;
    Ok(compute_ates_with(models, rows, contrast, options))
}

/// One activity's effect, or an invalid result describing the failure.
pub fn compute_activity(
    activity: &str,
    spec: &ModelSpec,
    rows: &[SurveyRow],
    contrast: &TreatmentContrast,
    options: &EngineOptions,
) -> AteResult {
    match estimate_activity(activity, spec, rows, contrast, options) {
        Ok(result) => {
            log::debug!(
                "Activity '{activity}': {} complete cases, effects {:?}",
                result.complete_cases,
                result.ate.to_vec()
            );
            result
        }
        Err(failure) => {
            log::warn!("Activity '{activity}' is invalid: {failure}");
            AteResult::invalid(activity, failure)
        }
    }
}

fn estimate_activity(
    activity: &str,
    spec: &ModelSpec,
    rows: &[SurveyRow],
    contrast: &TreatmentContrast,
    options: &EngineOptions,
) -> Result<AteResult, AteFailure> {
    let model = OrderedModel::from_spec(activity, spec)?;
    if !model.variables.contains(&contrast.covariate) {
        return Err(AteFailure::TreatmentNotInModel {
            covariate: contrast.covariate.clone(),
        });
    }

    // 1. Cohort restriction
    let cohort: Vec<&SurveyRow> = match &spec.rules.cohort {
        Some(predicate) => {
            let cohort: Vec<&SurveyRow> = rows.iter().filter(|row| predicate.matches(row)).collect();
            if cohort.is_empty() {
                return Err(AteFailure::EmptyCohort {
                    field: predicate.field().to_string(),
                });
            }
            cohort
        }
        None => rows.iter().collect(),
    };

    // 2. Complete cases
    let ctx = ImputationContext {
        treatment_covariate: &contrast.covariate,
        name_mappings: &contrast.name_mappings,
        catalog: &options.interactions,
        weight_fields: &options.weight_fields,
    };
    let required = required_covariates(&cohort, &model.variables, &ctx);
    let complete = complete_cases(&cohort, &required, &ctx);
    if complete.is_empty() {
        return Err(AteFailure::NoCompleteCases {
            cohort_rows: cohort.len(),
        });
    }

    // 3-4. Means and counterfactual profiles
    let means = impute_means(&complete, &model.variables, &ctx);
    if !means.unresolved.is_empty() {
        log::info!(
            "Activity '{activity}': covariates absent from the data were held at 0: {:?}",
            means.unresolved
        );
    }
    let (control_features, treatment_features) = build_feature_vectors(
        &means.values,
        &contrast.covariate,
        contrast.control_value,
        contrast.treatment_value,
    );

    // 5-6. Predict both and difference
    let control = model.predict(&control_features)?;
    let treatment = model.predict(&treatment_features)?;
    let ate = &treatment.probabilities - &control.probabilities;

    // 7. Conservation. Levels arrive clamped to [0, 1].
    let sum = ate.sum();
    if !sum.is_finite() || sum.abs() > options.conservation_tolerance {
        return Err(AteFailure::ConservationViolated {
            sum,
            tolerance: options.conservation_tolerance,
        });
    }

    // 8. Aggregation
    let mut table = LevelTable {
        control: control.probabilities,
        treatment: treatment.probabilities,
        ate,
        labels: control.labels,
    };
    if let Some(rule) = &spec.rules.aggregation {
        table = rule.apply(&table)?;
    }

    Ok(AteResult::valid(
        activity,
        table,
        complete.len(),
        means.unresolved,
    ))
}

/// A copy of `results` ordered by largest absolute per-level effect, valid
/// results first. The batch itself never reorders.
pub fn rank_by_effect(results: &[AteResult]) -> Vec<AteResult> {
    let mut ranked = results.to_vec();
    ranked.sort_by(|a, b| match (a.is_valid, b.is_valid) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => b.max_abs_effect().total_cmp(&a.max_abs_effect()),
    });
    ranked
}
