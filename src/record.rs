use std::collections::BTreeMap;

use serde_json::Value;

use crate::{RecordError, RegressionType};

/// Marker used wherever an original field value could not be recovered.
pub const NOT_AVAILABLE: &str = "N/A";

pub const COEFFICIENT: &str = "coefficient";
pub const STD_ERROR: &str = "std_error";
pub const SAMPLE_SIZE: &str = "sample_size";
pub const SIGNIFICANCE_LEVEL: &str = "significance_level";
// spelling used by older input sheets
pub const SIGNIFICANT_LEVEL: &str = "significant_level";
pub const REGRESSION_TYPE: &str = "regression_type";
pub const NUM_PREDICTORS: &str = "num_predictors";

/// Columns every input source must provide.
pub const REQUIRED_FIELDS: [&str; 3] = [COEFFICIENT, STD_ERROR, SAMPLE_SIZE];

/// One untyped row as handed over by a loader.
///
/// `null` values and blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, Value>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn significance_level(&self) -> Option<&Value> {
        self.get(SIGNIFICANCE_LEVEL)
            .or_else(|| self.get(SIGNIFICANT_LEVEL))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A row after coercion. Only types are checked here, the statistical preconditions
/// belong to the evaluators.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    pub coefficient: f64,
    pub std_error: f64,
    pub sample_size: i64,
    pub significance_level: Option<f64>,
    pub regression_type: Option<RegressionType>,
    pub num_predictors: Option<i64>,
}

impl InputRecord {
    pub fn new(coefficient: f64, std_error: f64, sample_size: i64) -> Self {
        Self {
            coefficient,
            std_error,
            sample_size,
            significance_level: None,
            regression_type: None,
            num_predictors: None,
        }
    }
}

impl TryFrom<&RawRecord> for InputRecord {
    type Error = RecordError;

    fn try_from(raw: &RawRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            coefficient: real(COEFFICIENT, required(raw, COEFFICIENT)?)?,
            std_error: real(STD_ERROR, required(raw, STD_ERROR)?)?,
            sample_size: integer(SAMPLE_SIZE, required(raw, SAMPLE_SIZE)?)?,
            significance_level: raw
                .significance_level()
                .map(|v| real(SIGNIFICANCE_LEVEL, v))
                .transpose()?,
            regression_type: raw
                .get(REGRESSION_TYPE)
                .map(regression_type)
                .transpose()?,
            num_predictors: raw
                .get(NUM_PREDICTORS)
                .map(|v| integer(NUM_PREDICTORS, v))
                .transpose()?,
        })
    }
}

fn required<'a>(raw: &'a RawRecord, field: &'static str) -> Result<&'a Value, RecordError> {
    raw.get(field).ok_or(RecordError::FieldCoercion {
        field,
        reason: "value is missing".to_string(),
    })
}

fn real(field: &'static str, value: &Value) -> Result<f64, RecordError> {
    let x = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| RecordError::FieldCoercion {
        field,
        reason: format!("{} is not a number", render(value)),
    })?;
    if !x.is_finite() {
        return Err(RecordError::FieldCoercion {
            field,
            reason: format!("{} is not finite", render(value)),
        });
    }
    Ok(x)
}

fn integer(field: &'static str, value: &Value) -> Result<i64, RecordError> {
    let from_f64 = |x: f64| {
        // 1e18 keeps the cast exact
        if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e18 {
            Some(x as i64)
        } else {
            None
        }
    };
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(from_f64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_f64))
        },
        _ => None,
    }
    .ok_or_else(|| RecordError::FieldCoercion {
        field,
        reason: format!("{} is not an integer", render(value)),
    })
}

fn regression_type(value: &Value) -> Result<RegressionType, RecordError> {
    match value {
        Value::String(s) => s.parse(),
        other => Err(RecordError::UnsupportedRegressionType(render(other))),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Best-effort copy of the original fields of a failed row.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub coefficient: Value,
    pub std_error: Value,
    pub sample_size: Value,
    pub significance_level: Value,
    pub regression_type: Value,
    pub num_predictors: Value,
}

impl Snapshot {
    pub fn of(raw: &RawRecord) -> Self {
        let take = |v: Option<&Value>| {
            v.cloned()
                .unwrap_or_else(|| Value::String(NOT_AVAILABLE.to_string()))
        };
        Self {
            coefficient: take(raw.get(COEFFICIENT)),
            std_error: take(raw.get(STD_ERROR)),
            sample_size: take(raw.get(SAMPLE_SIZE)),
            significance_level: take(raw.significance_level()),
            regression_type: take(raw.get(REGRESSION_TYPE)),
            num_predictors: take(raw.get(NUM_PREDICTORS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(pairs: &[(&str, Value)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[test]
    fn test_coerce_numbers() {
        let r = raw(&[
            ("coefficient", json!(2.5)),
            ("std_error", json!(0.8)),
            ("sample_size", json!(100)),
        ]);
        let rec = InputRecord::try_from(&r).unwrap();
        assert_eq!(rec, InputRecord::new(2.5, 0.8, 100));
    }

    #[test]
    fn test_coerce_strings() {
        let r = raw(&[
            ("coefficient", json!(" -1.25 ")),
            ("std_error", json!("0.5")),
            ("sample_size", json!("150.0")),
            ("significant_level", json!("0.01")),
            ("regression_type", json!(" Multiple")),
            ("num_predictors", json!("3")),
        ]);
        let rec = InputRecord::try_from(&r).unwrap();
        assert_eq!(rec.coefficient, -1.25);
        assert_eq!(rec.sample_size, 150);
        assert_eq!(rec.significance_level, Some(0.01));
        assert_eq!(rec.regression_type, Some(RegressionType::Multiple));
        assert_eq!(rec.num_predictors, Some(3));
    }

    #[test]
    fn test_significance_level_preferred_over_alias() {
        let r = raw(&[
            ("coefficient", json!(1.0)),
            ("std_error", json!(1.0)),
            ("sample_size", json!(10)),
            ("significance_level", json!(0.1)),
            ("significant_level", json!(0.01)),
        ]);
        let rec = InputRecord::try_from(&r).unwrap();
        assert_eq!(rec.significance_level, Some(0.1));
    }

    #[test]
    fn test_blank_optional_is_absent() {
        let r = raw(&[
            ("coefficient", json!(1.0)),
            ("std_error", json!(1.0)),
            ("sample_size", json!(10)),
            ("num_predictors", json!("  ")),
            ("regression_type", Value::Null),
        ]);
        let rec = InputRecord::try_from(&r).unwrap();
        assert_eq!(rec.num_predictors, None);
        assert_eq!(rec.regression_type, None);
    }

    #[test]
    fn test_non_numeric_coefficient() {
        let r = raw(&[
            ("coefficient", json!("abc")),
            ("std_error", json!(1.0)),
            ("sample_size", json!(10)),
        ]);
        let err = InputRecord::try_from(&r).unwrap_err();
        assert!(matches!(
            err,
            RecordError::FieldCoercion {
                field: "coefficient",
                ..
            }
        ));
    }

    #[test]
    fn test_fractional_sample_size() {
        let r = raw(&[
            ("coefficient", json!(1.0)),
            ("std_error", json!(1.0)),
            ("sample_size", json!(10.5)),
        ]);
        assert!(matches!(
            InputRecord::try_from(&r).unwrap_err(),
            RecordError::FieldCoercion {
                field: "sample_size",
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let r = raw(&[
            ("coefficient", json!(1.0)),
            ("std_error", json!("NaN")),
            ("sample_size", json!(10)),
        ]);
        assert!(matches!(
            InputRecord::try_from(&r).unwrap_err(),
            RecordError::FieldCoercion {
                field: "std_error",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_required() {
        let r = raw(&[("coefficient", json!(1.0)), ("sample_size", json!(10))]);
        assert_eq!(
            InputRecord::try_from(&r).unwrap_err(),
            RecordError::FieldCoercion {
                field: "std_error",
                reason: "value is missing".to_string()
            }
        );
    }

    #[test]
    fn test_unsupported_regression_type() {
        let r = raw(&[
            ("coefficient", json!(1.0)),
            ("std_error", json!(1.0)),
            ("sample_size", json!(10)),
            ("regression_type", json!("quadratic")),
        ]);
        assert_eq!(
            InputRecord::try_from(&r).unwrap_err(),
            RecordError::UnsupportedRegressionType("quadratic".to_string())
        );
    }

    #[test]
    fn test_snapshot_marks_missing() {
        let r = raw(&[("coefficient", json!("abc")), ("sample_size", json!(10))]);
        let s = Snapshot::of(&r);
        assert_eq!(s.coefficient, json!("abc"));
        assert_eq!(s.std_error, json!(NOT_AVAILABLE));
        assert_eq!(s.sample_size, json!(10));
        assert_eq!(s.num_predictors, json!(NOT_AVAILABLE));
    }
}
