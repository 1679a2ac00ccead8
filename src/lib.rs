pub mod batch;
mod config;
mod error;
pub mod eval;
mod file;
pub mod record;
mod regression;
pub mod summary;

use std::path::Path;

use tracing::{debug, info};

pub use crate::{
    batch::{process_batch, process_batch_parallel, Defaults, ErrorOutcome, Outcome},
    config::*,
    error::*,
    eval::{evaluate_multiple, evaluate_simple, ConfidenceInterval, Evaluation},
    file::*,
    record::{InputRecord, RawRecord, Snapshot},
    regression::*,
    summary::Summary,
};

/// Evaluate a batch of records with the defaults and parallelism from `config`.
/// Returns one outcome per record, in input order.
pub fn calculate_significance(records: &[RawRecord], config: &Config) -> Result<Vec<Outcome>, Error> {
    config.validate()?;
    if config.num_threads > 1 && records.len() > 1 {
        process_batch_parallel(records, config.defaults(), config.num_threads)
    } else {
        Ok(process_batch(records, config.defaults()))
    }
}

/// Load `input`, evaluate every record and write the outcomes to each of `outputs`.
/// `input` and `outputs` pick their format from the file extension.
#[tracing::instrument(skip(outputs, config))]
pub fn process_file(
    input: &Path,
    outputs: &[&Path],
    config: &Config,
) -> Result<Vec<Outcome>, Error> {
    config.validate()?;
    // resolve every output before doing any work
    let outputs = outputs
        .iter()
        .map(|p| File::from_path(*p))
        .collect::<Result<Vec<_>, _>>()?;
    let records = File::from_path(input)?.read_records()?;
    let outcomes = calculate_significance(&records, config)?;
    let options = WriteOptions::from(config);
    for output in &outputs {
        debug!("Writing {}", output.path().display());
        output.write_outcomes(&outcomes, &options)?;
    }
    info!(
        "Processed {} records from {}",
        outcomes.len(),
        input.display()
    );
    Ok(outcomes)
}
