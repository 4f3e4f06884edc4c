use crate::IpswError;
use nalgebra::{DMatrix, DVector};

/// Maximum number of step halvings tried when a Newton step lowers the log-likelihood.
const MAX_HALVINGS: usize = 30;

/// Represents the results of a Logistic Regression.
#[derive(Debug, Clone)]
pub struct LogitResult {
    pub coefficients: DVector<f64>,
    pub predicted_probs: DVector<f64>,
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Numerically stable logistic function.
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^t)` without overflow for large `t`.
fn log1p_exp(t: f64) -> f64 {
    if t > 0.0 {
        t + (-t).exp().ln_1p()
    } else {
        t.exp().ln_1p()
    }
}

/// Binomial log-likelihood evaluated at the linear predictor `xb`.
fn log_likelihood(y: &DVector<f64>, xb: &DVector<f64>) -> f64 {
    y.iter()
        .zip(xb.iter())
        .map(|(&yi, &eta)| yi * eta - log1p_exp(eta))
        .sum()
}

/// Performs Logistic Regression using Newton-Raphson optimization.
///
/// Each iteration solves `(X'WX) δ = X'(y - p)` by Cholesky, with
/// `W = diag(p(1-p))`. A step that lowers the log-likelihood is halved until
/// it does not, and the fit stops where no halving helps. Iteration stops once
/// the full Newton step satisfies `‖δ‖ < tol`.
///
/// # Arguments
///
/// * `y` - A binary `DVector` (0.0 or 1.0) representing the outcome.
/// * `x` - A `DMatrix` representing the predictors (should include intercept).
/// * `max_iter` - Maximum number of iterations.
/// * `tol` - Convergence tolerance on the Newton step norm.
///
/// # Returns
///
/// A `Result` containing the `LogitResult`. Running out of iterations is not an
/// error here; callers inspect `converged`.
pub fn logit(
    y: &DVector<f64>,
    x: &DMatrix<f64>,
    max_iter: usize,
    tol: f64,
) -> Result<LogitResult, IpswError> {
    let k = x.ncols();
    if x.nrows() != y.len() {
        return Err(IpswError::Data(format!(
            "Logit design has {} rows but response has {}",
            x.nrows(),
            y.len()
        )));
    }

    let mut beta = DVector::zeros(k);
    let mut ll = log_likelihood(y, &(x * &beta));

    for iter in 0..max_iter {
        let probs: DVector<f64> = (x * &beta).map(sigmoid);
        let gradient = x.transpose() * (y - &probs);

        // X'WX without materialising the n x n weight matrix.
        let w_diag: DVector<f64> = probs.map(|p| p * (1.0 - p));
        let mut x_w = x.clone();
        for j in 0..k {
            x_w.column_mut(j).component_mul_assign(&w_diag);
        }
        let information_matrix = x.transpose() * x_w;

        let cholesky = information_matrix.cholesky().ok_or_else(|| {
            IpswError::Fit(
                "Information matrix in logit is not positive definite. Perfect separation?"
                    .to_string(),
            )
        })?;

        let step = cholesky.solve(&gradient);
        let newton_norm = step.norm();
        let Some((candidate, ll_candidate)) = line_search(y, x, &beta, ll, step) else {
            // No point along the Newton direction improves on `beta`.
            let predicted_probs = (x * &beta).map(sigmoid);
            return Ok(LogitResult {
                coefficients: beta,
                predicted_probs,
                log_likelihood: ll,
                converged: newton_norm < tol,
                iterations: iter + 1,
            });
        };
        beta = candidate;
        ll = ll_candidate;

        if newton_norm < tol {
            let predicted_probs = (x * &beta).map(sigmoid);
            return Ok(LogitResult {
                coefficients: beta,
                predicted_probs,
                log_likelihood: ll,
                converged: true,
                iterations: iter + 1,
            });
        }
    }

    let predicted_probs = (x * &beta).map(sigmoid);
    Ok(LogitResult {
        coefficients: beta,
        predicted_probs,
        log_likelihood: ll,
        converged: false,
        iterations: max_iter,
    })
}

/// Halves `step` until `beta + step` does not lower the log-likelihood below
/// `ll`. `None` when every halving does.
fn line_search(
    y: &DVector<f64>,
    x: &DMatrix<f64>,
    beta: &DVector<f64>,
    ll: f64,
    mut step: DVector<f64>,
) -> Option<(DVector<f64>, f64)> {
    for _ in 0..=MAX_HALVINGS {
        let candidate = beta + &step;
        let ll_candidate = log_likelihood(y, &(x * &candidate));
        if ll_candidate >= ll {
            return Some((candidate, ll_candidate));
        }
        step *= 0.5;
    }
    None
}
