use crate::features::FeatureVector;
use crate::probability::{self, ProbabilityError};
use crate::rules::ActivityRules;
use crate::types::ProbabilityResult;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- Public Data Structures ---
// These structs mirror the JSON model artifact produced by the fitting
// pipeline. Sections are optional at this level so that a missing section is
// reported by the validator rather than rejected by the parser.

/// Defines the cumulative link connecting the latent score to the level probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkFunction {
    /// Ordered logit: logistic latent error.
    Logit,
    /// Ordered probit: standard normal latent error.
    Probit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub levels: usize,
    pub link: LinkFunction,
}

/// One activity's model exactly as loaded, before any structural checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
    #[serde(default)]
    pub coefficients: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub thresholds: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub variables: Option<Vec<String>>,
    /// Cohort restriction and aggregation for this activity.
    #[serde(default, skip_serializing_if = "ActivityRules::is_empty")]
    pub rules: ActivityRules,
}

/// Custom error type for model loading, saving, and structural resolution.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    Io(String),
    #[error("Failed to parse JSON model file: {0}")]
    JsonParse(String),
    #[error("Activity '{activity}' is missing its '{section}' section.")]
    MissingSection {
        activity: String,
        section: &'static str,
    },
    #[error("Activity '{activity}' declares variable '{variable}' without a coefficient.")]
    MissingCoefficient { activity: String, variable: String },
    #[error("Activity '{0}' appears more than once in the model collection.")]
    DuplicateActivity(String),
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::JsonParse(err.to_string())
    }
}

/// Every activity's model, kept in the order the artifact lists them.
///
/// That order is the natural iteration order of the batch: results come back
/// in it, not ranked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelCollection {
    entries: Vec<(String, ModelSpec)>,
}

impl ModelCollection {
    /// Builds a collection, rejecting repeated activity identifiers.
    pub fn from_entries(entries: Vec<(String, ModelSpec)>) -> Result<Self, ModelError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for (activity, _) in &entries {
            if !seen.insert(activity.as_str()) {
                return Err(ModelError::DuplicateActivity(activity.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, activity: &str) -> Option<&ModelSpec> {
        self.entries
            .iter()
            .find(|(id, _)| id == activity)
            .map(|(_, spec)| spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelSpec)> {
        self.entries.iter().map(|(id, spec)| (id.as_str(), spec))
    }

    pub fn activities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Attaches per-activity rules at load time. Rules for activities that
    /// are not in the collection are logged and ignored.
    pub fn with_activity_rules(mut self, rules: &BTreeMap<String, ActivityRules>) -> Self {
        for (activity, activity_rules) in rules {
            match self.entries.iter_mut().find(|(id, _)| id == activity) {
                Some((_, spec)) => spec.rules = activity_rules.clone(),
                None => log::warn!(
                    "Rules were configured for activity '{activity}', which has no model; ignoring them."
                ),
            }
        }
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a model collection from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Saves the collection as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(json.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl Serialize for ModelCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (activity, spec) in &self.entries {
            map.serialize_entry(activity, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ModelCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CollectionVisitor;

        impl<'de> Visitor<'de> for CollectionVisitor {
            type Value = ModelCollection;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from activity identifier to model configuration")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(8));
                while let Some((activity, spec)) = access.next_entry::<String, ModelSpec>()? {
                    entries.push((activity, spec));
                }
                ModelCollection::from_entries(entries).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_map(CollectionVisitor)
    }
}

/// An activity model resolved for inference: every section present and the
/// cutpoints sorted ascending by value.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedModel {
    pub levels: usize,
    pub link: LinkFunction,
    pub coefficients: BTreeMap<String, f64>,
    pub thresholds: Vec<f64>,
    pub variables: Vec<String>,
}

impl OrderedModel {
    /// Resolves a loaded spec. The level/threshold consistency is left to
    /// [`probability::ordered_probabilities`], which owns that check.
    pub fn from_spec(activity: &str, spec: &ModelSpec) -> Result<Self, ModelError> {
        let missing = |section: &'static str| ModelError::MissingSection {
            activity: activity.to_string(),
            section,
        };
        let metadata = spec.metadata.as_ref().ok_or_else(|| missing("metadata"))?;
        let coefficients = spec
            .coefficients
            .as_ref()
            .ok_or_else(|| missing("coefficients"))?;
        let thresholds = spec.thresholds.as_ref().ok_or_else(|| missing("thresholds"))?;
        let variables = spec.variables.as_ref().ok_or_else(|| missing("variables"))?;

        if let Some(variable) = variables.iter().find(|v| !coefficients.contains_key(*v)) {
            return Err(ModelError::MissingCoefficient {
                activity: activity.to_string(),
                variable: variable.clone(),
            });
        }

        let mut sorted: Vec<f64> = thresholds.values().copied().collect();
        sorted.sort_by(f64::total_cmp);

        Ok(Self {
            levels: metadata.levels,
            link: metadata.link,
            coefficients: coefficients.clone(),
            thresholds: sorted,
            variables: variables.clone(),
        })
    }

    /// Predicted outcome distribution for one covariate profile.
    pub fn predict(&self, features: &FeatureVector) -> Result<ProbabilityResult, ProbabilityError> {
        let mu = probability::linear_predictor(features, &self.coefficients);
        probability::ordered_probabilities(mu, &self.thresholds, self.levels, self.link)
    }
}
