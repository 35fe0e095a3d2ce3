//! Structural validation of the whole model collection.
//!
//! A single defect anywhere makes inference unavailable for the session:
//! callers check [`validate_model_data`] once and do not run the batch when it
//! fails, rather than rendering a screen of silently empty activities.

use crate::model::ModelCollection;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

/// One structural defect found in the collection.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ValidationIssue {
    #[error("The model collection contains no activities.")]
    EmptyCollection,
    #[error("Activity '{activity}' is missing its '{section}' section.")]
    MissingSection {
        activity: String,
        section: &'static str,
    },
    #[error("Activity '{activity}' declares {levels} levels; at least 2 are required.")]
    TooFewLevels { activity: String, levels: usize },
    #[error("Activity '{activity}' has {coefficients} coefficients but {variables} variables.")]
    CoefficientCountMismatch {
        activity: String,
        coefficients: usize,
        variables: usize,
    },
    #[error("Activity '{activity}' has {found} thresholds; {levels} levels need {expected}.")]
    ThresholdCountMismatch {
        activity: String,
        levels: usize,
        expected: usize,
        found: usize,
    },
    #[error("Activity '{activity}' declares variable '{variable}' without a coefficient.")]
    VariableWithoutCoefficient { activity: String, variable: String },
}

/// The collection failed validation; inference is unavailable.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Model collection failed validation with {} issue(s): {}", .issues.len(), .issues.iter().join("; "))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

/// Every structural defect in the collection, in activity order.
pub fn check_model_collection(models: &ModelCollection) -> Vec<ValidationIssue> {
    if models.is_empty() {
        return vec![ValidationIssue::EmptyCollection];
    }

    let mut issues = Vec::new();
    for (activity, spec) in models.iter() {
        let missing = |section: &'static str| ValidationIssue::MissingSection {
            activity: activity.to_string(),
            section,
        };
        let (Some(metadata), Some(coefficients), Some(thresholds), Some(variables)) = (
            spec.metadata.as_ref(),
            spec.coefficients.as_ref(),
            spec.thresholds.as_ref(),
            spec.variables.as_ref(),
        ) else {
            if spec.metadata.is_none() {
                issues.push(missing("metadata"));
            }
            if spec.coefficients.is_none() {
                issues.push(missing("coefficients"));
            }
            if spec.thresholds.is_none() {
                issues.push(missing("thresholds"));
            }
            if spec.variables.is_none() {
                issues.push(missing("variables"));
            }
            continue;
        };

        if metadata.levels < 2 {
            issues.push(ValidationIssue::TooFewLevels {
                activity: activity.to_string(),
                levels: metadata.levels,
            });
        }
        if coefficients.len() != variables.len() {
            issues.push(ValidationIssue::CoefficientCountMismatch {
                activity: activity.to_string(),
                coefficients: coefficients.len(),
                variables: variables.len(),
            });
        }
        let expected = metadata.levels.saturating_sub(1);
        if thresholds.len() != expected {
            issues.push(ValidationIssue::ThresholdCountMismatch {
                activity: activity.to_string(),
                levels: metadata.levels,
                expected,
                found: thresholds.len(),
            });
        }
        for variable in variables.iter().filter(|v| !coefficients.contains_key(*v)) {
            issues.push(ValidationIssue::VariableWithoutCoefficient {
                activity: activity.to_string(),
                variable: variable.clone(),
            });
        }
    }
    issues
}

/// True when the collection is structurally sound. Each defect is logged.
pub fn validate_model_data(models: &ModelCollection) -> bool {
    let issues = check_model_collection(models);
    for issue in &issues {
        log::warn!("Model validation: {issue}");
    }
    issues.is_empty()
}

/// [`check_model_collection`] as a `Result`, for callers that propagate with `?`.
pub fn ensure_valid(models: &ModelCollection) -> Result<(), ValidationError> {
    let issues = check_model_collection(models);
    if issues.is_empty() {
        Ok(())
    } else {
        for issue in &issues {
            log::warn!("Model validation: {issue}");
        }
        Err(ValidationError { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(json: &str) -> ModelCollection {
        ModelCollection::from_json_str(json).expect("well-formed JSON")
    }

    #[test]
    fn sound_collection_passes() {
        let models = collection(
            r#"{
                "car": {
                    "metadata": { "levels": 3, "link": "logit" },
                    "coefficients": { "x": 1.0, "sev": 0.4 },
                    "thresholds": { "1|2": -0.5, "2|3": 0.5 },
                    "variables": ["x", "sev"]
                }
            }"#,
        );
        assert!(validate_model_data(&models));
        assert!(ensure_valid(&models).is_ok());
    }

    #[test]
    fn one_bad_activity_fails_the_collection() {
        let models = collection(
            r#"{
                "car": {
                    "metadata": { "levels": 3, "link": "logit" },
                    "coefficients": { "x": 1.0 },
                    "thresholds": { "1|2": -0.5, "2|3": 0.5 },
                    "variables": ["x"]
                },
                "walk": {
                    "metadata": { "levels": 5, "link": "probit" },
                    "coefficients": { "x": 1.0 },
                    "thresholds": { "1|2": -0.5, "2|3": 0.5 },
                    "variables": ["x"]
                }
            }"#,
        );
        assert!(!validate_model_data(&models));
        assert_eq!(
            check_model_collection(&models),
            vec![ValidationIssue::ThresholdCountMismatch {
                activity: "walk".to_string(),
                levels: 5,
                expected: 4,
                found: 2
            }]
        );
    }

    #[test]
    fn every_missing_section_is_reported() {
        let models = collection(r#"{ "bus": { "variables": ["x"] } }"#);
        let issues = check_model_collection(&models);
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&ValidationIssue::MissingSection {
            activity: "bus".to_string(),
            section: "metadata"
        }));
    }

    #[test]
    fn coefficient_and_variable_sets_must_agree() {
        let models = collection(
            r#"{
                "bike": {
                    "metadata": { "levels": 2, "link": "logit" },
                    "coefficients": { "x": 1.0, "y": 2.0 },
                    "thresholds": { "1|2": 0.0 },
                    "variables": ["x", "z"]
                }
            }"#,
        );
        let issues = check_model_collection(&models);
        assert_eq!(
            issues,
            vec![ValidationIssue::VariableWithoutCoefficient {
                activity: "bike".to_string(),
                variable: "z".to_string()
            }]
        );

        let models = collection(
            r#"{
                "bike": {
                    "metadata": { "levels": 2, "link": "logit" },
                    "coefficients": { "x": 1.0, "y": 2.0 },
                    "thresholds": { "1|2": 0.0 },
                    "variables": ["x"]
                }
            }"#,
        );
        assert!(matches!(
            check_model_collection(&models).as_slice(),
            [ValidationIssue::CoefficientCountMismatch { coefficients: 2, variables: 1, .. }]
        ));
    }

    #[test]
    fn empty_collection_is_unavailable() {
        let err = ensure_valid(&ModelCollection::default()).unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::EmptyCollection]);
        assert!(err.to_string().contains("no activities"));
    }
}
