use clap::Parser;
use ipsw_late::{IpswBuilder, KappaEstimator};
use polars::prelude::*;
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Estimate an unconditional LATE/ACR by instrument propensity-score weighting
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the input CSV data file
    #[arg(short, long)]
    data: PathBuf,

    /// The name of the column that contains the outcome variable
    #[arg(long)]
    outcome: String,

    /// The name of the column that contains the (binary or ordered) treatment
    #[arg(long)]
    treatment: String,

    /// R-style propensity formula, instrument on the left (e.g., "nearc4 ~ exper + black + C(region)")
    #[arg(long)]
    formula: String,

    /// Weighting estimator [choices: normalized, unnormalized, kappa10]
    #[arg(long, default_value = "normalized")]
    estimator: String,

    /// The number of bootstrap replications for calculating standard errors
    #[arg(long, default_value_t = 500)]
    bootstrap_reps: usize,

    /// Seed for the bootstrap resampling
    #[arg(long, default_value_t = 52)]
    seed: u64,

    /// Failure share above which the bootstrap is reported as unreliable
    #[arg(long, default_value_t = 0.10)]
    max_failure_rate: f64,

    /// Maximum number of logit iterations
    #[arg(long, default_value_t = 100)]
    max_iter: usize,

    /// Path to export results as JSON
    #[arg(long)]
    output_json: Option<PathBuf>,

    /// Path to export results as Markdown
    #[arg(long)]
    output_markdown: Option<PathBuf>,
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    let df = LazyCsvReader::new(&args.data)
        .with_has_header(true)
        .finish()?
        .collect()?;

    let estimator: KappaEstimator = args.estimator.parse()?;
    let results = IpswBuilder::from_formula(df, &args.formula, &args.outcome, &args.treatment)?
        .estimator(estimator)
        .bootstrap_reps(args.bootstrap_reps)
        .seed(args.seed)
        .max_failure_rate(args.max_failure_rate)
        .solver(args.max_iter, 1e-8)
        .run()?;

    results.summary();
    if let Some(path) = args.output_json {
        let json = results
            .to_json()
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;
        std::fs::write(path, json)?;
    }
    if let Some(path) = args.output_markdown {
        std::fs::write(path, results.to_markdown())?;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
