//! Summary statistics of a bootstrap distribution.
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

/// Standard error, normal-approximation p-value and percentile interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BootstrapStats {
    pub std_err: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Sample standard deviation (`n - 1` denominator). NaN for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

/// Calculates the standard error, p-value, and 95% confidence interval from
/// bootstrap replicate estimates.
///
/// The standard error is the sample standard deviation of the replicates. The
/// p-value tests a zero effect with `z = point / std_err` against the standard
/// normal. The interval takes the 2.5th and 97.5th percentiles of the
/// replicates.
pub fn bootstrap_stats(estimates: &[f64], point_estimate: f64) -> BootstrapStats {
    let std_err = sample_std_dev(estimates);
    if !std_err.is_finite() {
        return BootstrapStats {
            std_err: f64::NAN,
            p_value: f64::NAN,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
        };
    }

    let p_value = if std_err > 0.0 {
        // The unit normal parameters are always valid.
        Normal::new(0.0, 1.0)
            .map(|normal| 2.0 * (1.0 - normal.cdf((point_estimate / std_err).abs())))
            .unwrap_or(f64::NAN)
    } else {
        f64::NAN
    };

    let mut sorted = estimates.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = sorted.len() as f64;
    let lower_idx = (0.025 * n).floor() as usize;
    let upper_idx = ((0.975 * n).floor() as usize).min(sorted.len() - 1);

    BootstrapStats {
        std_err,
        p_value,
        ci_lower: sorted[lower_idx],
        ci_upper: sorted[upper_idx],
    }
}
