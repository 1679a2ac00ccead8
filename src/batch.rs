use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    eval::{evaluate_multiple, evaluate_simple, Evaluation},
    record::{InputRecord, RawRecord, Snapshot},
    Error, ErrorKind, RecordError, RegressionType,
};

/// Values used for every record that does not override them.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Defaults {
    pub alpha: f64,
    pub regression_type: RegressionType,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            regression_type: RegressionType::Simple,
        }
    }
}

/// A record that could not be evaluated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorOutcome {
    pub row_index: usize,
    pub error_kind: ErrorKind,
    pub error_message: String,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success(Evaluation),
    Error(ErrorOutcome),
}

impl Outcome {
    pub fn row_index(&self) -> usize {
        match self {
            // always set by the batch processor
            Outcome::Success(e) => e.row_index().unwrap_or_default(),
            Outcome::Error(e) => e.row_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_significant(&self) -> bool {
        matches!(self, Outcome::Success(e) if e.is_significant())
    }

    pub fn as_success(&self) -> Option<&Evaluation> {
        match self {
            Outcome::Success(e) => Some(e),
            Outcome::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorOutcome> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Error(e) => Some(e),
        }
    }
}

/// Evaluate a typed record with the per-record overrides applied on top of `defaults`.
pub fn evaluate(record: &InputRecord, defaults: Defaults) -> Result<Evaluation, RecordError> {
    let alpha = record.significance_level.unwrap_or(defaults.alpha);
    match record.regression_type.unwrap_or(defaults.regression_type) {
        RegressionType::Simple => evaluate_simple(
            record.coefficient,
            record.std_error,
            record.sample_size,
            alpha,
        ),
        RegressionType::Multiple => evaluate_multiple(
            record.coefficient,
            record.std_error,
            record.sample_size,
            record.num_predictors,
            alpha,
        ),
    }
}

/// Coerce and evaluate one raw row. Never fails: any error becomes an
/// [`Outcome::Error`] carrying what could be recovered of the row.
pub fn evaluate_record(raw: &RawRecord, row_index: usize, defaults: Defaults) -> Outcome {
    match InputRecord::try_from(raw).and_then(|r| evaluate(&r, defaults)) {
        Ok(mut e) => {
            e.row_index = Some(row_index);
            Outcome::Success(e)
        },
        Err(err) => {
            debug!("Row {} failed: {}", row_index, err);
            Outcome::Error(ErrorOutcome {
                row_index,
                error_kind: err.kind(),
                error_message: err.to_string(),
                snapshot: Snapshot::of(raw),
            })
        },
    }
}

/// Evaluate every record in order. The output always has one outcome per record.
#[tracing::instrument(skip(records), fields(records = records.len()))]
pub fn process_batch(records: &[RawRecord], defaults: Defaults) -> Vec<Outcome> {
    let outcomes = records
        .iter()
        .enumerate()
        .map(|(i, r)| evaluate_record(r, i + 1, defaults))
        .collect::<Vec<_>>();
    log_counts(&outcomes);
    outcomes
}

/// Same as [`process_batch`] but spread over a dedicated pool of `num_threads` threads.
/// Records share no state, so the outcomes are identical to the sequential ones.
#[tracing::instrument(skip(records), fields(records = records.len()))]
pub fn process_batch_parallel(
    records: &[RawRecord],
    defaults: Defaults,
    num_threads: usize,
) -> Result<Vec<Outcome>, Error> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("coefsig-{}", i))
        .build()?;
    let outcomes = pool.install(|| {
        records
            .par_iter()
            .enumerate()
            .map(|(i, r)| evaluate_record(r, i + 1, defaults))
            .collect::<Vec<_>>()
    });
    log_counts(&outcomes);
    Ok(outcomes)
}

fn log_counts(outcomes: &[Outcome]) {
    let errors = outcomes.iter().filter(|o| !o.is_success()).count();
    info!(
        "Evaluated {} records, {} failed",
        outcomes.len(),
        errors
    );
}
