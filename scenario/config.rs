//! # Scenario configuration
//!
//! A scenario file names the treatment contrast and everything about the
//! analysis that is not part of a fitted model: schema renames, derived
//! covariates, weight fields, missing-value codes and per-activity rules.
//! Every section except `[contrast]` is optional.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::features::TreatmentContrast;
use crate::imputation::{DEFAULT_WEIGHT_FIELDS, InteractionCatalog};
use crate::model::ModelCollection;
use crate::pipeline::{CONSERVATION_TOLERANCE, EngineOptions};
use crate::rules::ActivityRules;
use crate::scenario::io::LoadOptions;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse scenario TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Scenario conservation tolerance must be a positive finite number, got {0}.")]
    InvalidTolerance(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastSection {
    pub covariate: String,
    pub control: f64,
    pub treatment: f64,
    /// `control` and `treatment` are points on the 5-point severity scale
    /// and are binarised before use.
    #[serde(default)]
    pub severity_levels: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationSection {
    #[serde(default = "default_weight_fields")]
    pub weight_fields: Vec<String>,
}

impl Default for ImputationSection {
    fn default() -> Self {
        Self {
            weight_fields: default_weight_fields(),
        }
    }
}

fn default_weight_fields() -> Vec<String> {
    DEFAULT_WEIGHT_FIELDS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadingSection {
    #[serde(default)]
    pub missing_codes: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_tolerance")]
    pub conservation_tolerance: f64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            conservation_tolerance: default_tolerance(),
        }
    }
}

fn default_tolerance() -> f64 {
    CONSERVATION_TOLERANCE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub contrast: ContrastSection,
    #[serde(default)]
    pub name_mappings: HashMap<String, String>,
    /// Added on top of the built-in catalog; an entry here replaces a
    /// built-in one with the same name.
    #[serde(default = "InteractionCatalog::empty")]
    pub interactions: InteractionCatalog,
    #[serde(default)]
    pub imputation: ImputationSection,
    #[serde(default)]
    pub loading: LoadingSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub activities: BTreeMap<String, ActivityRules>,
}

impl ScenarioConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = toml::from_str(text)?;
        let tolerance = config.engine.conservation_tolerance;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ScenarioError::InvalidTolerance(tolerance));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!(
            "Loaded scenario from {}: '{}' {} -> {}, {} activity rule(s)",
            path.display(),
            config.contrast.covariate,
            config.contrast.control,
            config.contrast.treatment,
            config.activities.len()
        );
        Ok(config)
    }

    pub fn treatment_contrast(&self) -> TreatmentContrast {
        let c = &self.contrast;
        let contrast = if c.severity_levels {
            TreatmentContrast::from_severity_levels(&c.covariate, c.control, c.treatment)
        } else {
            TreatmentContrast::new(&c.covariate, c.control, c.treatment)
        };
        contrast.with_name_mappings(self.name_mappings.clone())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            interactions: InteractionCatalog::default().merged(&self.interactions),
            weight_fields: self.imputation.weight_fields.clone(),
            conservation_tolerance: self.engine.conservation_tolerance,
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            missing_codes: self.loading.missing_codes.clone(),
        }
    }

    /// Attaches the configured cohort and aggregation rules to `models`.
    pub fn apply_rules(&self, models: ModelCollection) -> ModelCollection {
        models.with_activity_rules(&self.activities)
    }
}
