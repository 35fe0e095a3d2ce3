//! # Covariate mean imputation
//!
//! Builds the "average respondent" that every counterfactual prediction is
//! made for: one weighted mean per model covariate over a row subset.
//!
//! Fitted models sometimes use interaction covariates (products of two base
//! covariates) that the live survey export never carries as a column. The
//! [`InteractionCatalog`] declares those products so they can be recomputed
//! row by row from their bases.
//!
//! The same resolution rules decide which rows are complete cases, so the
//! listwise deletion in the pipeline and the means computed here can never
//! disagree about what "resolvable" means.

use crate::features::FeatureVector;
use crate::rows::SurveyRow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Weight columns recognised in survey exports, in priority order.
pub const DEFAULT_WEIGHT_FIELDS: &[&str] = &["weight", "wt", "survey_weight"];

/// Derived covariate name to the pair of base covariates whose product it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionCatalog(BTreeMap<String, (String, String)>);

impl Default for InteractionCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        catalog.insert("a6170ve0", "age_6170", "hhveh0");
        catalog
    }
}

impl InteractionCatalog {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(
        &mut self,
        derived: impl Into<String>,
        base_a: impl Into<String>,
        base_b: impl Into<String>,
    ) {
        self.0.insert(derived.into(), (base_a.into(), base_b.into()));
    }

    /// Adds or replaces entries from `other`.
    pub fn merged(mut self, other: &InteractionCatalog) -> Self {
        for (derived, bases) in &other.0 {
            self.0.insert(derived.clone(), bases.clone());
        }
        self
    }

    pub fn bases(&self, derived: &str) -> Option<(&str, &str)> {
        self.0
            .get(derived)
            .map(|(a, b)| (a.as_str(), b.as_str()))
    }
}

/// Where an imputed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanSource {
    /// The treatment covariate; placeholder 0, overridden by the contrast.
    Treatment,
    Direct,
    Interaction,
    /// Nothing in the rows could produce a value; defaulted to 0.
    Unresolved,
}

/// Everything imputation needs besides the rows themselves.
#[derive(Debug, Clone, Copy)]
pub struct ImputationContext<'a> {
    pub treatment_covariate: &'a str,
    pub name_mappings: &'a HashMap<String, String>,
    pub catalog: &'a InteractionCatalog,
    pub weight_fields: &'a [String],
}

impl<'a> ImputationContext<'a> {
    fn field<'b>(&'b self, covariate: &'b str) -> &'b str {
        self.name_mappings
            .get(covariate)
            .map(String::as_str)
            .unwrap_or(covariate)
    }

    fn direct(&self, row: &SurveyRow, covariate: &str) -> Option<f64> {
        row.numeric(self.field(covariate))
    }

    fn product(&self, row: &SurveyRow, covariate: &str) -> Option<f64> {
        let (base_a, base_b) = self.catalog.bases(covariate)?;
        Some(self.direct(row, base_a)? * self.direct(row, base_b)?)
    }

    /// The covariate's value on this row, read directly or rebuilt from the
    /// catalog.
    pub fn resolve(&self, row: &SurveyRow, covariate: &str) -> Option<f64> {
        self.direct(row, covariate)
            .or_else(|| self.product(row, covariate))
    }

    pub fn is_treatment(&self, covariate: &str) -> bool {
        covariate == self.treatment_covariate
    }
}

/// The first recognised weight field holding a positive number, else 1.
pub fn row_weight(row: &SurveyRow, weight_fields: &[String]) -> f64 {
    weight_fields
        .iter()
        .filter_map(|field| row.numeric(field))
        .find(|w| *w > 0.0)
        .unwrap_or(1.0)
}

fn weighted_mean<F>(rows: &[&SurveyRow], weight_fields: &[String], value: F) -> Option<f64>
where
    F: Fn(&SurveyRow) -> Option<f64>,
{
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut contributed = false;
    for row in rows {
        if let Some(v) = value(*row) {
            let w = row_weight(row, weight_fields);
            weighted_sum += v * w;
            total_weight += w;
            contributed = true;
        }
    }
    (contributed && total_weight > 0.0).then(|| weighted_sum / total_weight)
}

/// Imputed covariate values plus the diagnostics of how each was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputedMeans {
    pub values: FeatureVector,
    pub sources: BTreeMap<String, MeanSource>,
    pub unresolved: Vec<String>,
}

impl ImputedMeans {
    /// Covariates recomputed from the interaction catalog.
    pub fn derived(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .filter(|(_, source)| **source == MeanSource::Interaction)
            .map(|(name, _)| name.as_str())
    }
}

/// One representative value per covariate over `rows`.
pub fn impute_means(
    rows: &[&SurveyRow],
    covariates: &[String],
    ctx: &ImputationContext<'_>,
) -> ImputedMeans {
    let mut values = FeatureVector::default();
    let mut sources = BTreeMap::new();
    let mut unresolved = Vec::new();

    for covariate in covariates {
        let (value, source) = if ctx.is_treatment(covariate) {
            (0.0, MeanSource::Treatment)
        } else if let Some(mean) =
            weighted_mean(rows, ctx.weight_fields, |row| ctx.direct(row, covariate))
        {
            (mean, MeanSource::Direct)
        } else if let Some(mean) = ctx.catalog.bases(covariate).and_then(|_| {
            weighted_mean(rows, ctx.weight_fields, |row| ctx.product(row, covariate))
        }) {
            (mean, MeanSource::Interaction)
        } else {
            unresolved.push(covariate.clone());
            (0.0, MeanSource::Unresolved)
        };
        values.insert(covariate.clone(), value);
        sources.insert(covariate.clone(), source);
    }

    if !unresolved.is_empty() {
        log::debug!("Covariates defaulted to 0 for lack of data: {unresolved:?}");
    }

    ImputedMeans {
        values,
        sources,
        unresolved,
    }
}

/// Non-treatment covariates that at least one row can resolve. A covariate
/// no row can resolve is absent from the data schema altogether and is left
/// to the unresolved default instead of emptying the complete-case set.
pub fn required_covariates<'c>(
    rows: &[&SurveyRow],
    covariates: &'c [String],
    ctx: &ImputationContext<'_>,
) -> Vec<&'c str> {
    covariates
        .iter()
        .map(String::as_str)
        .filter(|covariate| !ctx.is_treatment(covariate))
        .filter(|covariate| rows.iter().any(|row| ctx.resolve(row, covariate).is_some()))
        .collect()
}

/// Listwise deletion: rows on which every required covariate resolves.
pub fn complete_cases<'r>(
    rows: &[&'r SurveyRow],
    required: &[&str],
    ctx: &ImputationContext<'_>,
) -> Vec<&'r SurveyRow> {
    rows.iter()
        .copied()
        .filter(|row| required.iter().all(|covariate| ctx.resolve(row, covariate).is_some()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn weight_fields() -> Vec<String> {
        DEFAULT_WEIGHT_FIELDS.iter().map(|s| s.to_string()).collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn direct_mean_is_weighted() {
        let rows = [
            SurveyRow::new().with("x", 1.0).with("weight", 3.0),
            SurveyRow::new().with("x", 5.0).with("weight", 1.0),
            SurveyRow::new().with("x", "n/a").with("weight", 10.0),
        ];
        let refs: Vec<&SurveyRow> = rows.iter().collect();
        let mappings = HashMap::new();
        let catalog = InteractionCatalog::default();
        let fields = weight_fields();
        let ctx = ImputationContext {
            treatment_covariate: "sev",
            name_mappings: &mappings,
            catalog: &catalog,
            weight_fields: &fields,
        };

        let means = impute_means(&refs, &names(&["x", "sev"]), &ctx);
        assert_abs_diff_eq!(means.values.get("x").unwrap(), 2.0, epsilon = 1e-12);
        assert_eq!(means.values.get("sev"), Some(0.0));
        assert_eq!(means.sources["sev"], MeanSource::Treatment);
        assert_eq!(means.sources["x"], MeanSource::Direct);
        assert!(means.unresolved.is_empty());
    }

    #[test]
    fn weight_is_first_positive_recognised_field() {
        let fields = weight_fields();
        let row = SurveyRow::new().with("weight", 0.0).with("wt", 2.5);
        assert_eq!(row_weight(&row, &fields), 2.5);
        let row = SurveyRow::new().with("weight", "-1");
        assert_eq!(row_weight(&row, &fields), 1.0);
        assert_eq!(row_weight(&SurveyRow::new(), &fields), 1.0);
        let row = SurveyRow::new().with("weight", 4.0).with("wt", 2.0);
        assert_eq!(row_weight(&row, &fields), 4.0);
    }

    #[test]
    fn derived_covariate_falls_back_to_product_of_bases() {
        let rows: Vec<SurveyRow> = (0..10)
            .map(|i| {
                SurveyRow::new()
                    .with("age_6170", if i % 2 == 0 { 1.0 } else { 0.0 })
                    .with("hhveh0", if i % 3 == 0 { 1.0 } else { 0.0 })
                    .with("weight", 1.0 + i as f64)
            })
            .collect();
        let refs: Vec<&SurveyRow> = rows.iter().collect();

        let mut expected_num = 0.0;
        let mut expected_den = 0.0;
        for row in &rows {
            let w = row.numeric("weight").unwrap();
            expected_num += row.numeric("age_6170").unwrap() * row.numeric("hhveh0").unwrap() * w;
            expected_den += w;
        }

        let mappings = HashMap::new();
        let catalog = InteractionCatalog::default();
        let fields = weight_fields();
        let ctx = ImputationContext {
            treatment_covariate: "sev",
            name_mappings: &mappings,
            catalog: &catalog,
            weight_fields: &fields,
        };
        let means = impute_means(&refs, &names(&["a6170ve0"]), &ctx);
        assert_abs_diff_eq!(
            means.values.get("a6170ve0").unwrap(),
            expected_num / expected_den,
            epsilon = 1e-12
        );
        assert_eq!(means.derived().collect::<Vec<_>>(), vec!["a6170ve0"]);
    }

    #[test]
    fn product_skips_rows_with_a_non_numeric_base() {
        let rows = [
            SurveyRow::new().with("age_6170", 1.0).with("hhveh0", 1.0),
            SurveyRow::new().with("age_6170", 1.0).with("hhveh0", "refused"),
            SurveyRow::new().with("age_6170", 0.0).with("hhveh0", 1.0),
        ];
        let refs: Vec<&SurveyRow> = rows.iter().collect();
        let mappings = HashMap::new();
        let catalog = InteractionCatalog::default();
        let fields = weight_fields();
        let ctx = ImputationContext {
            treatment_covariate: "sev",
            name_mappings: &mappings,
            catalog: &catalog,
            weight_fields: &fields,
        };
        let means = impute_means(&refs, &names(&["a6170ve0"]), &ctx);
        assert_abs_diff_eq!(means.values.get("a6170ve0").unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn missing_base_leaves_derived_covariate_unresolved() {
        let rows = [SurveyRow::new().with("age_6170", 1.0)];
        let refs: Vec<&SurveyRow> = rows.iter().collect();
        let mappings = HashMap::new();
        let catalog = InteractionCatalog::default();
        let fields = weight_fields();
        let ctx = ImputationContext {
            treatment_covariate: "sev",
            name_mappings: &mappings,
            catalog: &catalog,
            weight_fields: &fields,
        };
        let means = impute_means(&refs, &names(&["a6170ve0", "not_in_catalog"]), &ctx);
        assert_eq!(means.values.get("a6170ve0"), Some(0.0));
        assert_eq!(means.values.get("not_in_catalog"), Some(0.0));
        assert_eq!(means.unresolved, names(&["a6170ve0", "not_in_catalog"]));
    }

    #[test]
    fn name_mappings_apply_to_direct_fields_and_bases() {
        let rows = [
            SurveyRow::new().with("age_61_70", 1.0).with("hhveh0", 1.0),
            SurveyRow::new().with("age_61_70", 1.0).with("hhveh0", 0.0),
        ];
        let refs: Vec<&SurveyRow> = rows.iter().collect();
        let mappings = HashMap::from([("age_6170".to_string(), "age_61_70".to_string())]);
        let catalog = InteractionCatalog::default();
        let fields = weight_fields();
        let ctx = ImputationContext {
            treatment_covariate: "sev",
            name_mappings: &mappings,
            catalog: &catalog,
            weight_fields: &fields,
        };
        let means = impute_means(&refs, &names(&["age_6170", "a6170ve0"]), &ctx);
        assert_abs_diff_eq!(means.values.get("age_6170").unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(means.values.get("a6170ve0").unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn complete_cases_drop_rows_missing_a_required_covariate() {
        let rows = [
            SurveyRow::new().with("x", 1.0).with("age_6170", 1.0).with("hhveh0", 0.0),
            SurveyRow::new().with("age_6170", 1.0).with("hhveh0", 1.0),
            SurveyRow::new().with("x", 2.0).with("age_6170", 1.0),
            SurveyRow::new().with("x", 3.0).with("a6170ve0", 1.0),
        ];
        let refs: Vec<&SurveyRow> = rows.iter().collect();
        let mappings = HashMap::new();
        let catalog = InteractionCatalog::default();
        let fields = weight_fields();
        let ctx = ImputationContext {
            treatment_covariate: "sev",
            name_mappings: &mappings,
            catalog: &catalog,
            weight_fields: &fields,
        };
        let covariates = names(&["x", "a6170ve0", "sev", "never_collected"]);
        let required = required_covariates(&refs, &covariates, &ctx);
        assert_eq!(required, vec!["x", "a6170ve0"]);

        let complete = complete_cases(&refs, &required, &ctx);
        assert_eq!(complete.len(), 2);
        assert_eq!(complete[0].numeric("x"), Some(1.0));
        assert_eq!(complete[1].numeric("x"), Some(3.0));
    }
}
