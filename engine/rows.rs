//! Sparse survey records.
//!
//! Survey exports are loosely typed: a field may be missing, blank, textual,
//! or numeric-looking text. Every consumer in the engine goes through the two
//! accessors here, [`SurveyRow::is_present`] and [`SurveyRow::numeric`],
//! instead of coercing strings where they are used.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single raw cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// The finite numeric reading of this cell, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                lexical_core::parse::<f64>(trimmed.as_bytes()).ok()?
            }
            FieldValue::Null => return None,
        };
        value.is_finite().then_some(value)
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Number(_) => false,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// One respondent's record: field name to raw value, any field optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurveyRow {
    fields: HashMap<String, FieldValue, RandomState>,
}

impl SurveyRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// True when the field exists and is neither null nor blank text.
    pub fn is_present(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|v| !v.is_blank())
    }

    /// The field as a finite number, or `None` when absent, blank,
    /// non-numeric, or non-finite.
    pub fn numeric(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(FieldValue::as_number)
    }

    /// Keeps only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &FieldValue) -> bool) {
        self.fields.retain(|field, value| keep(field, value));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for SurveyRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = SurveyRow::new();
        for (field, value) in iter {
            row.insert(field, value);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_accepts_numbers_and_numeric_text() {
        let row = SurveyRow::new()
            .with("a", 2.5)
            .with("b", " 3 ")
            .with("c", "1e-2")
            .with("d", "-7");
        assert_eq!(row.numeric("a"), Some(2.5));
        assert_eq!(row.numeric("b"), Some(3.0));
        assert_eq!(row.numeric("c"), Some(0.01));
        assert_eq!(row.numeric("d"), Some(-7.0));
    }

    #[test]
    fn numeric_rejects_blank_text_and_non_finite_values() {
        let row = SurveyRow::new()
            .with("blank", "   ")
            .with("word", "refused")
            .with("nan", f64::NAN)
            .with("inf", "inf")
            .with("null", FieldValue::Null);
        for field in ["blank", "word", "nan", "inf", "null", "absent"] {
            assert_eq!(row.numeric(field), None, "field {field}");
        }
    }

    #[test]
    fn presence_ignores_blank_and_null_cells() {
        let row = SurveyRow::new()
            .with("blank", "")
            .with("null", FieldValue::Null)
            .with("word", "yes");
        assert!(!row.is_present("blank"));
        assert!(!row.is_present("null"));
        assert!(!row.is_present("absent"));
        assert!(row.is_present("word"));
    }

    #[test]
    fn rows_deserialize_from_flat_json_records() {
        let rows: Vec<SurveyRow> =
            serde_json::from_str(r#"[{"age": 34, "hhveh0": "1", "note": null}, {}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].numeric("age"), Some(34.0));
        assert_eq!(rows[0].numeric("hhveh0"), Some(1.0));
        assert_eq!(rows[0].get("note"), Some(&FieldValue::Null));
        assert!(rows[1].is_empty());
    }
}
