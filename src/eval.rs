use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use tracing::trace;

use crate::{RecordError, RegressionType};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Two-tailed Student t test of a single coefficient against zero.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Evaluation {
    coefficient: f64,
    std_error: f64,
    sample_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num_predictors: Option<i64>,
    degrees_of_freedom: i64,
    t_statistic: f64,
    p_value: f64,
    is_significant: bool,
    alpha_used: f64,
    confidence_interval: ConfidenceInterval,
    margin_of_error: f64,
    regression_type_used: RegressionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) row_index: Option<usize>,
}

impl Evaluation {
    #[inline]
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    #[inline]
    pub fn std_error(&self) -> f64 {
        self.std_error
    }

    #[inline]
    pub fn sample_size(&self) -> i64 {
        self.sample_size
    }

    /// Only set for multiple regression.
    #[inline]
    pub fn num_predictors(&self) -> Option<i64> {
        self.num_predictors
    }

    #[inline]
    pub fn degrees_of_freedom(&self) -> i64 {
        self.degrees_of_freedom
    }

    #[inline]
    pub fn t_statistic(&self) -> f64 {
        self.t_statistic
    }

    #[inline]
    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    #[inline]
    pub fn is_significant(&self) -> bool {
        self.is_significant
    }

    #[inline]
    pub fn alpha_used(&self) -> f64 {
        self.alpha_used
    }

    #[inline]
    pub fn confidence_interval(&self) -> ConfidenceInterval {
        self.confidence_interval
    }

    #[inline]
    pub fn margin_of_error(&self) -> f64 {
        self.margin_of_error
    }

    #[inline]
    pub fn regression_type_used(&self) -> RegressionType {
        self.regression_type_used
    }

    /// 1-based position in the batch, `None` when evaluated on its own.
    #[inline]
    pub fn row_index(&self) -> Option<usize> {
        self.row_index
    }
}

/// Significance of a simple regression coefficient, `df = n - 2`.
pub fn evaluate_simple(
    coefficient: f64,
    std_error: f64,
    sample_size: i64,
    alpha: f64,
) -> Result<Evaluation, RecordError> {
    check_finite(coefficient, alpha)?;
    check_std_error(std_error)?;
    if sample_size <= 2 {
        return Err(RecordError::InvalidInput(format!(
            "sample size must be greater than 2 for simple regression, got {}",
            sample_size
        )));
    }
    let df = sample_size - 2;
    t_test(
        coefficient,
        std_error,
        sample_size,
        df,
        alpha,
        RegressionType::Simple,
        None,
    )
}

/// Significance of a coefficient from a regression on `num_predictors` predictors plus
/// intercept, `df = n - k - 1`.
pub fn evaluate_multiple(
    coefficient: f64,
    std_error: f64,
    sample_size: i64,
    num_predictors: Option<i64>,
    alpha: f64,
) -> Result<Evaluation, RecordError> {
    let k = num_predictors.ok_or(RecordError::MissingField(crate::record::NUM_PREDICTORS))?;
    if k < 1 {
        return Err(RecordError::InvalidInput(format!(
            "number of predictors must be at least 1, got {}",
            k
        )));
    }
    check_finite(coefficient, alpha)?;
    check_std_error(std_error)?;
    let df = sample_size.saturating_sub(k).saturating_sub(1);
    if df <= 0 {
        return Err(RecordError::InvalidInput(format!(
            "degrees of freedom must be positive, got {} (sample size {}, {} predictors)",
            df, sample_size, k
        )));
    }
    t_test(
        coefficient,
        std_error,
        sample_size,
        df,
        alpha,
        RegressionType::Multiple,
        Some(k),
    )
}

fn check_finite(coefficient: f64, alpha: f64) -> Result<(), RecordError> {
    if !coefficient.is_finite() {
        return Err(RecordError::InvalidInput(format!(
            "coefficient must be finite, got {}",
            coefficient
        )));
    }
    if !alpha.is_finite() {
        return Err(RecordError::InvalidInput(format!(
            "significance level must be finite, got {}",
            alpha
        )));
    }
    Ok(())
}

fn check_std_error(std_error: f64) -> Result<(), RecordError> {
    if std_error.is_finite() && std_error > 0.0 {
        Ok(())
    } else {
        Err(RecordError::InvalidInput(format!(
            "standard error must be positive, got {}",
            std_error
        )))
    }
}

#[allow(clippy::too_many_arguments)]
fn t_test(
    coefficient: f64,
    std_error: f64,
    sample_size: i64,
    df: i64,
    alpha: f64,
    regression_type: RegressionType,
    num_predictors: Option<i64>,
) -> Result<Evaluation, RecordError> {
    let t_distr = StudentsT::new(0.0, 1.0, df as f64)
        .map_err(|e| RecordError::InvalidInput(e.to_string()))?;
    let t = coefficient / std_error;
    let p_value = (2.0 * (1.0 - t_distr.cdf(t.abs()))).clamp(0.0, 1.0);
    let t_critical = critical_value(&t_distr, alpha)?;
    let margin = t_critical * std_error;
    trace!(df, t, p_value, t_critical, "t test");
    Ok(Evaluation {
        coefficient,
        std_error,
        sample_size,
        num_predictors,
        degrees_of_freedom: df,
        t_statistic: t,
        p_value,
        is_significant: p_value < alpha,
        alpha_used: alpha,
        confidence_interval: ConfidenceInterval {
            lower: coefficient - margin,
            upper: coefficient + margin,
        },
        margin_of_error: margin,
        regression_type_used: regression_type,
        row_index: None,
    })
}

/// Above this many degrees of freedom the t quantile comes from the normal expansion.
const LARGE_DF: f64 = 200.0;

// alpha is not range checked per record, so the quantile may fall outside [0, 1]
fn critical_value(t_distr: &StudentsT, alpha: f64) -> Result<f64, RecordError> {
    let q = 1.0 - alpha / 2.0;
    Ok(if q > 0.0 && q < 1.0 {
        if t_distr.freedom() > LARGE_DF {
            large_df_quantile(q, t_distr.freedom())?
        } else {
            t_distr.inverse_cdf(q)
        }
    } else if q == 1.0 {
        f64::INFINITY
    } else if q == 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    })
}

// Cornish-Fisher expansion of the t quantile around the normal one (Abramowitz and
// Stegun 26.7.5). statrs' inverse t CDF drifts and then stalls for very large df.
fn large_df_quantile(q: f64, df: f64) -> Result<f64, RecordError> {
    let z = Normal::new(0.0, 1.0)
        .map_err(|e| RecordError::InvalidInput(e.to_string()))?
        .inverse_cdf(q);
    let z2 = z * z;
    let g1 = z * (z2 + 1.0) / 4.0;
    let g2 = z * ((5.0 * z2 + 16.0) * z2 + 3.0) / 96.0;
    let g3 = z * (((3.0 * z2 + 19.0) * z2 + 17.0) * z2 - 15.0) / 384.0;
    let g4 = z * ((((79.0 * z2 + 776.0) * z2 + 1482.0) * z2 - 1920.0) * z2 - 945.0) / 92160.0;
    Ok(z + g1 / df + g2 / df.powi(2) + g3 / df.powi(3) + g4 / df.powi(4))
}
