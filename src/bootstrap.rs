//! Nonparametric row bootstrap of a scalar estimator.
//!
//! # Seeding
//!
//! A master `StdRng::seed_from_u64(seed)` draws one `u64` per replicate, in
//! replicate order. Replicate `r` then seeds its own `StdRng` with that value
//! and draws its `n` row indices with `gen_range(0..n)`. Replicates therefore
//! share no generator state, and the draws do not depend on which thread runs
//! which replicate.
use crate::data::IvData;
use crate::inference::sample_std_dev;
use crate::IpswError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Failure share above which bootstrap results are flagged unreliable.
pub const DEFAULT_MAX_FAILURE_RATE: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub reps: usize,
    pub seed: u64,
    pub max_failure_rate: f64,
    /// Replicates that have not started when the flag is raised are skipped.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            reps: 500,
            seed: 52,
            max_failure_rate: DEFAULT_MAX_FAILURE_RATE,
            cancel: None,
        }
    }
}

/// Which stage of the estimator a replicate failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Data,
    Fit,
    Estimation,
}

impl From<&IpswError> for FailureKind {
    fn from(err: &IpswError) -> Self {
        match err {
            IpswError::Fit(_) => FailureKind::Fit,
            IpswError::Estimation(_) => FailureKind::Estimation,
            _ => FailureKind::Data,
        }
    }
}

/// A bootstrap replicate whose estimator returned an error. It is excluded
/// from the standard error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicateFailure {
    pub replicate: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// Replicate estimates in replicate order, plus the failures.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOutcome {
    pub requested: usize,
    pub estimates: Vec<f64>,
    pub failures: Vec<ReplicateFailure>,
    /// Replicates skipped because of cancellation.
    pub skipped: usize,
}

impl BootstrapOutcome {
    /// Replicates that ran to success or failure.
    pub fn completed(&self) -> usize {
        self.estimates.len() + self.failures.len()
    }

    /// Share of completed replicates that failed. Zero when none completed.
    pub fn failure_rate(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            c => self.failures.len() as f64 / c as f64,
        }
    }

    /// Sample standard deviation of the successful replicate estimates.
    pub fn std_err(&self) -> f64 {
        sample_std_dev(&self.estimates)
    }

    /// Enough successes for a standard error and a failure rate within bounds.
    pub fn is_reliable(&self, max_failure_rate: f64) -> bool {
        self.estimates.len() >= 2 && self.failure_rate() <= max_failure_rate
    }
}

/// Per-replicate seeds derived from the master seed.
pub fn replicate_seeds(seed: u64, reps: usize) -> Vec<u64> {
    let mut master = StdRng::seed_from_u64(seed);
    (0..reps).map(|_| master.gen::<u64>()).collect()
}

/// `n` row indices drawn uniformly with replacement.
pub fn resample_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Runs `estimator` on `options.reps` resamples of `data` in parallel.
///
/// Failing replicates are recorded, never replaced by a value.
pub fn run_bootstrap<F>(data: &IvData, options: &BootstrapOptions, estimator: F) -> BootstrapOutcome
where
    F: Fn(&IvData) -> Result<f64, IpswError> + Sync,
{
    let n = data.nrows();
    let seeds = replicate_seeds(options.seed, options.reps);
    let cancel = options.cancel.as_deref();

    let results: Vec<Option<Result<f64, IpswError>>> = seeds
        .par_iter()
        .map(|&seed| {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return None;
            }
            let indices = resample_indices(n, seed);
            Some(estimator(&data.resample(&indices)))
        })
        .collect();

    let mut outcome = BootstrapOutcome {
        requested: options.reps,
        ..Default::default()
    };
    for (replicate, result) in results.into_iter().enumerate() {
        match result {
            Some(Ok(estimate)) => outcome.estimates.push(estimate),
            Some(Err(err)) => {
                tracing::debug!(replicate, error = %err, "bootstrap replicate failed");
                outcome.failures.push(ReplicateFailure {
                    replicate,
                    kind: FailureKind::from(&err),
                    message: err.to_string(),
                });
            }
            None => outcome.skipped += 1,
        }
    }

    if !outcome.failures.is_empty() {
        tracing::warn!(
            failed = outcome.failures.len(),
            completed = outcome.completed(),
            "bootstrap replications failed and were discarded"
        );
    }
    if outcome.skipped > 0 {
        tracing::info!(
            skipped = outcome.skipped,
            "bootstrap cancelled before all replications ran"
        );
    }
    outcome
}
