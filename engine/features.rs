use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Covariate name to value, as fed to the linear predictor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn value_or_zero(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The counterfactual being asked about: move `covariate` from
/// `control_value` to `treatment_value`, everything else at its mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentContrast {
    /// The model's canonical treatment covariate. Which event's experience
    /// selected the rows is decided upstream by row filtering, never here.
    pub covariate: String,
    pub control_value: f64,
    pub treatment_value: f64,
    /// Model covariate name to data field name, for fields the live survey
    /// schema spells differently from the fitted model.
    #[serde(default)]
    pub name_mappings: HashMap<String, String>,
}

impl TreatmentContrast {
    pub fn new(covariate: impl Into<String>, control_value: f64, treatment_value: f64) -> Self {
        Self {
            covariate: covariate.into(),
            control_value,
            treatment_value,
            name_mappings: HashMap::new(),
        }
    }

    /// Contrast between two points on the 5-point severity scale, collapsed
    /// to the binary exposure the models were fitted on.
    pub fn from_severity_levels(
        covariate: impl Into<String>,
        control_level: f64,
        treatment_level: f64,
    ) -> Self {
        Self::new(
            covariate,
            binarize_severity(control_level),
            binarize_severity(treatment_level),
        )
    }

    pub fn with_name_mappings(mut self, mappings: HashMap<String, String>) -> Self {
        self.name_mappings = mappings;
        self
    }
}

/// Severity levels 3 and above count as exposed.
pub fn binarize_severity(level: f64) -> f64 {
    if level >= 3.0 { 1.0 } else { 0.0 }
}

/// Control and treatment profiles that differ only in `covariate`.
pub fn build_feature_vectors(
    means: &FeatureVector,
    covariate: &str,
    control_value: f64,
    treatment_value: f64,
) -> (FeatureVector, FeatureVector) {
    let mut control = means.clone();
    let mut treatment = means.clone();
    control.insert(covariate, control_value);
    treatment.insert(covariate, treatment_value);
    (control, treatment)
}
