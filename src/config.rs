use tracing::debug;

use crate::{batch::Defaults, Error, RegressionType};

pub const ENV_ALPHA: &str = "COEFSIG_ALPHA";
pub const ENV_REGRESSION_TYPE: &str = "COEFSIG_REGRESSION_TYPE";
pub const ENV_NUM_THREADS: &str = "COEFSIG_NUM_THREADS";
pub const ENV_PRECISION: &str = "COEFSIG_PRECISION";
pub const ENV_NO_DESCRIPTIONS: &str = "COEFSIG_NO_DESCRIPTIONS";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Significance level for records without their own.
    pub alpha: f64,
    /// Regression type for records without their own.
    pub regression_type: RegressionType,
    /// Worker threads for the batch, `1` runs it on the calling thread.
    pub num_threads: usize,
    /// Decimal places used by the text writers.
    pub precision: usize,
    /// Write a human readable description row below the header of text outputs.
    pub descriptions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            regression_type: RegressionType::Simple,
            num_threads: 1,
            precision: 6,
            descriptions: true,
        }
    }
}

impl Config {
    /// Defaults overridden by any `COEFSIG_*` environment variables that are set.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_ALPHA) {
            config.alpha = parse(ENV_ALPHA, &v)?;
        }
        if let Some(v) = lookup(ENV_REGRESSION_TYPE) {
            config.regression_type = v
                .parse()
                .map_err(|_| Error::UnsupportedRegressionType(v.clone()))?;
        }
        if let Some(v) = lookup(ENV_NUM_THREADS) {
            config.num_threads = match v.trim() {
                "0" | "auto" => num_cpus::get(),
                _ => parse(ENV_NUM_THREADS, &v)?,
            };
        }
        if let Some(v) = lookup(ENV_PRECISION) {
            config.precision = parse(ENV_PRECISION, &v)?;
        }
        if let Some(v) = lookup(ENV_NO_DESCRIPTIONS) {
            config.descriptions = matches!(v.trim(), "" | "0" | "false");
        }
        debug!("Loaded config {:?}", config);
        config.validate()?;
        Ok(config)
    }

    /// The global default alpha must lie in (0, 1). Per-record levels are not checked.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::InvalidAlpha(self.alpha));
        }
        if self.num_threads == 0 {
            return Err(Error::InvalidConfig {
                name: ENV_NUM_THREADS,
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn defaults(&self) -> Defaults {
        Defaults {
            alpha: self.alpha,
            regression_type: self.regression_type,
        }
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| Error::InvalidConfig {
        name,
        value: value.to_string(),
    })
}
