//! Instrument propensity-score weighting (IPSW) estimators of the unconditional
//! local average treatment effect (LATE) or average causal response (ACR).
//!
//! The instrument propensity score `Q = P(Z = 1 | X)` is fitted by logit. The
//! estimate is the ratio of two weighted contrasts, the instrument's effect on
//! the outcome over its effect on the treatment. Standard errors come from a
//! seeded nonparametric bootstrap.
//!
//! # Example
//!
//! ```ignore
//! use polars::prelude::*;
//! use ipsw_late::IpswBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let df = CsvReadOptions::default()
//!         .with_has_header(true)
//!         .try_into_reader_with_file_path(Some("card.csv".into()))?
//!         .finish()?;
//!
//!     let results = IpswBuilder::from_formula(
//!         df,
//!         "nearc4 ~ exper + expersq + black + south + smsa + C(region) + smsa66",
//!         "lwage",
//!         "educ",
//!     )?
//!     .bootstrap_reps(500)
//!     .seed(52)
//!     .run()?;
//!
//!     results.summary();
//!     Ok(())
//! }
//! ```

use comfy_table::{Cell, Table};
use getset::Getters;
use polars::prelude::*;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

pub mod bootstrap;
pub mod data;
pub mod formula;
mod inference;
pub mod kappa;
mod math;
pub mod propensity;
pub mod weighting;

pub use crate::bootstrap::{BootstrapOptions, FailureKind, ReplicateFailure};
pub use crate::data::IvData;
pub use crate::formula::Formula;
pub use crate::inference::{bootstrap_stats, sample_std_dev, BootstrapStats};
pub use crate::kappa::{kappa_estimate, KappaEstimator};
pub use crate::propensity::{
    fit_propensity, FittedPropensity, OverlapSummary, PropensityModel, PropensityOptions,
};
pub use crate::weighting::{ipsw_components, ipsw_estimate, IpswComponents, WeightedSums};

use crate::bootstrap::run_bootstrap;

/// Error type for the `ipsw_late` library.
#[derive(Debug, Error)]
pub enum IpswError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    /// A column named by the outcome, treatment or formula is missing.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),
    #[error("Invalid formula: {0}")]
    Formula(String),
    /// Input data violates an invariant: empty, non-binary instrument, non-numeric values.
    #[error("Data error: {0}")]
    Data(String),
    /// The propensity logit failed or produced a score of exactly 0 or 1.
    #[error("Fit error: {0}")]
    Fit(String),
    /// The estimate is undefined, e.g. a zero first stage.
    #[error("Estimation error: {0}")]
    Estimation(String),
}

/// Fits the propensity score and computes one estimate on `data`.
///
/// A constant instrument is rejected before fitting.
pub fn single_pass(
    data: &IvData,
    options: &PropensityOptions,
    estimator: KappaEstimator,
) -> Result<(IpswComponents, FittedPropensity), IpswError> {
    if data.instrument_is_constant() {
        return Err(IpswError::Estimation(format!(
            "Instrument equals {} in all {} rows",
            data.z()[0],
            data.nrows()
        )));
    }
    let propensity = fit_propensity(data, options)?;
    let components = kappa_estimate(data, &propensity, estimator)?;
    Ok((components, propensity))
}

/// IPSW point estimate with its bootstrap standard error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapSe {
    pub estimate: f64,
    /// Sample standard deviation of the successful replicates.
    pub std_err: f64,
    pub successes: usize,
    pub failures: Vec<ReplicateFailure>,
    /// False when more than `DEFAULT_MAX_FAILURE_RATE` of the replicates
    /// failed or fewer than two succeeded.
    pub reliable: bool,
}

/// IPSW point estimate and bootstrap standard error with default solver
/// settings.
///
/// A failure on the full sample is returned as an error. Failed replicates are
/// skipped and reported in `failures`, and the standard error is NaN when
/// fewer than two succeed.
pub fn bootstrap_se(data: &IvData, reps: usize, seed: u64) -> Result<BootstrapSe, IpswError> {
    let propensity_options = PropensityOptions::default();
    let (point, _) = single_pass(data, &propensity_options, KappaEstimator::Normalized)?;
    let options = BootstrapOptions {
        reps,
        seed,
        ..Default::default()
    };
    let outcome = run_bootstrap(data, &options, |d| {
        single_pass(d, &propensity_options, KappaEstimator::Normalized).map(|(c, _)| c.estimate)
    });

    let reliable = outcome.is_reliable(options.max_failure_rate);
    if reps > 0 && !reliable {
        tracing::warn!(
            failure_rate = outcome.failure_rate(),
            successes = outcome.estimates.len(),
            "bootstrap standard error is unreliable"
        );
    }
    Ok(BootstrapSe {
        estimate: point.estimate,
        std_err: outcome.std_err(),
        successes: outcome.estimates.len(),
        failures: outcome.failures,
        reliable,
    })
}

/// The main entry point for configuring and running an IPSW estimation.
///
/// This struct is created using a builder pattern.
#[derive(Debug, Clone)]
pub struct IpswBuilder {
    dataframe: DataFrame,
    outcome: String,
    treatment: String,
    formula: Formula,
    estimator: KappaEstimator,
    bootstrap: BootstrapOptions,
    propensity: PropensityOptions,
}

impl IpswBuilder {
    /// Creates a new `IpswBuilder` with an intercept-only propensity model.
    ///
    /// # Arguments
    ///
    /// * `dataframe` - A `polars::DataFrame` containing the data for the analysis.
    /// * `outcome` - The outcome column (e.g., "lwage").
    /// * `treatment` - The treatment column, binary or ordered (e.g., "educ").
    /// * `instrument` - The binary 0/1 instrument column (e.g., "nearc4").
    pub fn new(dataframe: DataFrame, outcome: &str, treatment: &str, instrument: &str) -> Self {
        Self {
            dataframe,
            outcome: outcome.to_string(),
            treatment: treatment.to_string(),
            formula: Formula {
                instrument: instrument.to_string(),
                covariates: Vec::new(),
                categorical_covariates: Vec::new(),
            },
            estimator: KappaEstimator::default(),
            bootstrap: BootstrapOptions::default(),
            propensity: PropensityOptions::default(),
        }
    }

    /// Creates a new `IpswBuilder` from an R-style propensity formula
    /// (e.g., "nearc4 ~ exper + black + C(region)").
    pub fn from_formula(
        dataframe: DataFrame,
        formula: &str,
        outcome: &str,
        treatment: &str,
    ) -> Result<Self, IpswError> {
        let formula = Formula::parse(formula)?;
        let mut builder = Self::new(dataframe, outcome, treatment, &formula.instrument);
        builder.formula = formula;
        Ok(builder)
    }

    /// Sets the numeric covariates of the propensity model.
    pub fn covariates(&mut self, covariates: &[&str]) -> &mut Self {
        self.formula.covariates = covariates.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Sets the categorical covariates, expanded into level indicators.
    pub fn categorical_covariates(&mut self, covariates: &[&str]) -> &mut Self {
        self.formula.categorical_covariates = covariates.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Selects the weighting estimator. Defaults to `KappaEstimator::Normalized` (IPSW).
    pub fn estimator(&mut self, estimator: KappaEstimator) -> &mut Self {
        self.estimator = estimator;
        self
    }

    /// Sets the number of bootstrap replications. Defaults to 500.
    pub fn bootstrap_reps(&mut self, reps: usize) -> &mut Self {
        self.bootstrap.reps = reps;
        self
    }

    /// Sets the bootstrap seed. Defaults to 52.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.bootstrap.seed = seed;
        self
    }

    /// Failure share above which the bootstrap is flagged unreliable. Defaults to 0.10.
    pub fn max_failure_rate(&mut self, rate: f64) -> &mut Self {
        self.bootstrap.max_failure_rate = rate;
        self
    }

    /// Stops starting new replications once `flag` is set.
    pub fn cancel_flag(&mut self, flag: Arc<AtomicBool>) -> &mut Self {
        self.bootstrap.cancel = Some(flag);
        self
    }

    /// Sets the logit iteration limit and convergence tolerance.
    pub fn solver(&mut self, max_iter: usize, tol: f64) -> &mut Self {
        self.propensity.max_iter = max_iter;
        self.propensity.tol = tol;
        self
    }

    /// Prepares the numeric data the estimators run on.
    pub fn iv_data(&self) -> Result<IvData, IpswError> {
        IvData::from_dataframe(&self.dataframe, &self.outcome, &self.treatment, &self.formula)
    }

    /// Executes the estimation and the bootstrap.
    pub fn run(&self) -> Result<IpswResults, IpswError> {
        let data = self.iv_data()?;
        let (point, propensity) = single_pass(&data, &self.propensity, self.estimator)?;

        let overlap = propensity.overlap();
        if overlap.n_extreme > 0 {
            tracing::warn!(
                rows = overlap.n_extreme,
                min = overlap.min,
                max = overlap.max,
                "propensity scores close to 0 or 1 produce extreme weights"
            );
        }
        let model = propensity.model();
        if !model.dropped_names().is_empty() {
            tracing::warn!(dropped = ?model.dropped_names(), "dropped collinear covariates");
        }

        let outcome = run_bootstrap(&data, &self.bootstrap, |d| {
            single_pass(d, &self.propensity, self.estimator).map(|(c, _)| c.estimate)
        });
        let stats = bootstrap_stats(&outcome.estimates, point.estimate);
        let reliable = outcome.is_reliable(self.bootstrap.max_failure_rate);
        if self.bootstrap.reps > 0 && !reliable {
            tracing::warn!(
                failure_rate = outcome.failure_rate(),
                successes = outcome.estimates.len(),
                "bootstrap standard error is unreliable"
            );
        }

        Ok(IpswResults {
            estimator: self.estimator,
            estimate: point.estimate,
            reduced_form: point.reduced_form,
            first_stage: point.first_stage,
            std_err: stats.std_err,
            p_value: stats.p_value,
            ci_lower: stats.ci_lower,
            ci_upper: stats.ci_upper,
            n_obs: data.nrows(),
            covariates: model.kept_names().clone(),
            dropped_covariates: model.dropped_names().clone(),
            overlap,
            seed: self.bootstrap.seed,
            bootstrap_requested: outcome.requested,
            bootstrap_successes: outcome.estimates.len(),
            bootstrap_skipped: outcome.skipped,
            failures: outcome.failures,
            reliable,
        })
    }
}

/// Holds the point estimate and its bootstrap inference.
#[derive(Debug, Clone, Getters, Serialize)]
#[getset(get = "pub")]
pub struct IpswResults {
    estimator: KappaEstimator,
    /// LATE (binary treatment) or ACR (ordered treatment).
    estimate: f64,
    reduced_form: f64,
    first_stage: f64,
    /// Sample standard deviation of the successful bootstrap estimates.
    std_err: f64,
    p_value: f64,
    ci_lower: f64,
    ci_upper: f64,
    n_obs: usize,
    /// Propensity design columns used in the fit, intercept included.
    covariates: Vec<String>,
    /// Columns dropped as collinear on the full sample.
    dropped_covariates: Vec<String>,
    overlap: OverlapSummary,
    seed: u64,
    bootstrap_requested: usize,
    bootstrap_successes: usize,
    bootstrap_skipped: usize,
    failures: Vec<ReplicateFailure>,
    /// False when too many replicates failed or fewer than two succeeded.
    reliable: bool,
}

impl IpswResults {
    /// Prints a formatted summary of the results to the console.
    pub fn summary(&self) {
        println!("IPSW Estimation Results");
        println!("========================================");
        println!("Estimator: {}", self.estimator);
        println!("Observations: {}", self.n_obs);
        println!(
            "Propensity score range: [{:.4}, {:.4}], {} rows outside [0.01, 0.99]",
            self.overlap.min, self.overlap.max, self.overlap.n_extreme
        );
        println!();

        let mut table = Table::new();
        table.set_header(vec!["Component", "Estimate", "Std. Err.", "p-value", "95% CI"]);
        table.add_row(vec![
            Cell::new("LATE/ACR"),
            Cell::new(format!("{:.4}", self.estimate)),
            Cell::new(format!("{:.4}", self.std_err)),
            Cell::new(format!("{:.4}", self.p_value)),
            Cell::new(format!("[{:.3}, {:.3}]", self.ci_lower, self.ci_upper)),
        ]);
        table.add_row(vec![
            Cell::new("reduced form"),
            Cell::new(format!("{:.4}", self.reduced_form)),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("first stage"),
            Cell::new(format!("{:.4}", self.first_stage)),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
        ]);
        println!("{}", table);

        println!(
            "Bootstrap: {} of {} replications succeeded (seed {})",
            self.bootstrap_successes, self.bootstrap_requested, self.seed
        );
        if !self.failures.is_empty() {
            println!("{} replications failed and were discarded", self.failures.len());
        }
        if !self.reliable {
            println!("Warning: the bootstrap standard error is unreliable");
        }
    }

    /// Exports the results to a Markdown table.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("### IPSW Estimation Results\n\n");
        md.push_str(&format!(
            "Estimator: {}, N = {}, bootstrap {}/{} (seed {})\n\n",
            self.estimator, self.n_obs, self.bootstrap_successes, self.bootstrap_requested, self.seed
        ));
        md.push_str("| Component | Estimate | Std. Err. | p-value | 95% CI |\n");
        md.push_str("|---|---|---|---|---|\n");
        md.push_str(&format!(
            "| LATE/ACR | {:.4} | {:.4} | {:.4} | [{:.3}, {:.3}] |\n",
            self.estimate, self.std_err, self.p_value, self.ci_lower, self.ci_upper
        ));
        md.push_str(&format!("| reduced form | {:.4} | | | |\n", self.reduced_form));
        md.push_str(&format!("| first stage | {:.4} | | | |\n", self.first_stage));
        if !self.reliable {
            md.push_str("\n**Warning:** the bootstrap standard error is unreliable.\n");
        }
        md
    }

    /// Exports the results to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
