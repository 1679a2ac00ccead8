use std::str::FromStr;

use crate::RecordError;

/// The regression a coefficient was estimated from. Decides how the degrees of freedom
/// are derived; both variants assume the model had an intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionType {
    /// One predictor plus intercept, `df = n - 2`.
    #[default]
    Simple,
    /// `k` predictors plus intercept, `df = n - k - 1`.
    Multiple,
}

impl RegressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegressionType::Simple => "simple",
            RegressionType::Multiple => "multiple",
        }
    }
}

impl std::fmt::Display for RegressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RegressionType {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Self::Simple,
            "multiple" => Self::Multiple,
            _ => return Err(RecordError::UnsupportedRegressionType(s.to_string())),
        })
    }
}
