use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use coefsig::{
    calculate_significance, summary::render_table, Config, File, RegressionType, Summary,
    WriteOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RegressionArg {
    Simple,
    Multiple,
}

impl From<RegressionArg> for RegressionType {
    fn from(arg: RegressionArg) -> Self {
        match arg {
            RegressionArg::Simple => RegressionType::Simple,
            RegressionArg::Multiple => RegressionType::Multiple,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "coefsig")]
#[command(version)]
#[command(about = "Test the significance of precomputed regression coefficients", long_about = None)]
struct Cli {
    /// Input file (csv, tsv, txt, xlsx, json or cbor, optionally .gz)
    input: PathBuf,

    /// Output file, the format follows the extension. May be given more than once
    #[arg(short, long = "output", value_name = "FILE")]
    outputs: Vec<PathBuf>,

    /// Significance level for rows without their own
    #[arg(short, long)]
    alpha: Option<f64>,

    /// Regression type for rows without their own
    #[arg(short = 't', long = "regression-type", value_enum)]
    regression_type: Option<RegressionArg>,

    /// Worker threads, 0 uses every core
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Decimal places in text outputs
    #[arg(long)]
    precision: Option<usize>,

    /// Skip the description row in text outputs
    #[arg(long)]
    no_descriptions: bool,

    /// Do not print the results table
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::from_env().context("invalid COEFSIG_* environment")?;
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if let Some(t) = self.regression_type {
            config.regression_type = t.into();
        }
        if let Some(threads) = self.threads {
            config.num_threads = if threads == 0 {
                num_cpus::get()
            } else {
                threads
            };
        }
        if let Some(precision) = self.precision {
            config.precision = precision;
        }
        if self.no_descriptions {
            config.descriptions = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.config()?;

    let outputs = cli
        .outputs
        .iter()
        .map(File::from_path)
        .collect::<Result<Vec<_>, _>>()
        .context("unsupported output file")?;
    let records = File::from_path(&cli.input)?
        .read_records()
        .with_context(|| format!("failed to load {}", cli.input.display()))?;

    let outcomes = calculate_significance(&records, &config)?;
    if !cli.quiet {
        print!("{}", render_table(&outcomes));
        println!();
    }
    print!("{}", Summary::new(&outcomes));

    let options = WriteOptions::from(&config);
    for output in &outputs {
        output
            .write_outcomes(&outcomes, &options)
            .with_context(|| format!("failed to write {}", output.path().display()))?;
        println!("Wrote {}", output.path().display());
    }
    Ok(())
}
