#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Inference engine for scenario analysis over pre-fitted ordered-categorical
//! survey models. The computation holds no caches and no shared mutable
//! state; apart from model collection load/save, file handling lives in
//! [`scenario`].

pub mod features;
pub mod imputation;
pub mod model;
pub mod pipeline;
pub mod probability;
pub mod rows;
pub mod rules;
pub mod types;
pub mod validate;

#[path = "../scenario/mod.rs"]
pub mod scenario;

pub use features::{FeatureVector, TreatmentContrast, binarize_severity, build_feature_vectors};
pub use model::{LinkFunction, ModelCollection, ModelError, ModelSpec, OrderedModel};
pub use pipeline::{EngineOptions, compute_ates, compute_ates_with, rank_by_effect, run_scenario};
pub use rows::{FieldValue, SurveyRow};
pub use types::{AteFailure, AteResult, ProbabilityResult};
pub use validate::{ValidationError, ValidationIssue, check_model_collection, validate_model_data};
