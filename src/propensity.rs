//! Instrument propensity scores from a logistic regression of `Z` on covariates.
use crate::data::IvData;
use crate::math::collinearity::{independent_columns, DEFAULT_COLLINEARITY_TOL};
use crate::math::logit::{logit, sigmoid};
use crate::IpswError;
use getset::Getters;
use nalgebra::{DMatrix, DVector};

/// Propensity scores below `OVERLAP_BAND` or above `1 - OVERLAP_BAND` are
/// reported as extreme.
pub const OVERLAP_BAND: f64 = 0.01;

/// Solver settings for the propensity logit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropensityOptions {
    pub max_iter: usize,
    pub tol: f64,
    pub collinearity_tol: f64,
}

impl Default for PropensityOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-8,
            collinearity_tol: DEFAULT_COLLINEARITY_TOL,
        }
    }
}

/// Fitted logit coefficients over the design columns that survived the
/// collinearity check.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct PropensityModel {
    coefficients: DVector<f64>,
    kept_columns: Vec<usize>,
    kept_names: Vec<String>,
    dropped_names: Vec<String>,
    iterations: usize,
}

impl PropensityModel {
    /// `P(Z = 1 | X)` for every row of a full design matrix (all columns,
    /// including the dropped ones).
    pub fn predict(&self, x: &DMatrix<f64>) -> DVector<f64> {
        (x.select_columns(&self.kept_columns) * &self.coefficients).map(sigmoid)
    }
}

/// One propensity score per row, strictly inside (0, 1).
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct FittedPropensity {
    scores: DVector<f64>,
    model: PropensityModel,
}

impl FittedPropensity {
    /// Wraps externally supplied scores, checking they are strictly interior.
    pub fn from_scores(scores: DVector<f64>) -> Result<Self, IpswError> {
        check_interior(&scores)?;
        let model = PropensityModel {
            coefficients: DVector::zeros(0),
            kept_columns: Vec::new(),
            kept_names: Vec::new(),
            dropped_names: Vec::new(),
            iterations: 0,
        };
        Ok(Self { scores, model })
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Summary of how close the scores come to the boundary.
    pub fn overlap(&self) -> OverlapSummary {
        let n = self.scores.len() as f64;
        OverlapSummary {
            min: self.scores.min(),
            max: self.scores.max(),
            mean: self.scores.sum() / n,
            n_extreme: self
                .scores
                .iter()
                .filter(|&&q| !(OVERLAP_BAND..=1.0 - OVERLAP_BAND).contains(&q))
                .count(),
        }
    }
}

/// Range of the fitted propensity scores.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct OverlapSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Rows with a score outside `[OVERLAP_BAND, 1 - OVERLAP_BAND]`.
    pub n_extreme: usize,
}

/// Fits `P(Z = 1 | X)` by maximum-likelihood logit and returns the in-sample
/// fitted probabilities.
///
/// Collinear design columns are dropped before fitting, which leaves the
/// fitted probabilities unchanged. Fails with `IpswError::Fit` when the solver
/// does not converge or a fitted probability reaches exactly 0 or 1.
pub fn fit_propensity(
    data: &IvData,
    options: &PropensityOptions,
) -> Result<FittedPropensity, IpswError> {
    let x = data.x();
    let kept_columns = independent_columns(x, options.collinearity_tol);
    if kept_columns.is_empty() {
        return Err(IpswError::Fit(
            "Propensity design has no usable columns".to_string(),
        ));
    }

    let names = data.column_names();
    let kept_names: Vec<String> = kept_columns.iter().map(|&j| names[j].clone()).collect();
    let dropped_names: Vec<String> = (0..x.ncols())
        .filter(|j| !kept_columns.contains(j))
        .map(|j| names[j].clone())
        .collect();
    if !dropped_names.is_empty() {
        tracing::debug!(dropped = ?dropped_names, "dropped collinear propensity columns");
    }

    let x_kept = x.select_columns(&kept_columns);
    let result = logit(data.z(), &x_kept, options.max_iter, options.tol)?;
    if !result.converged {
        return Err(IpswError::Fit(format!(
            "Propensity logit did not converge in {} iterations",
            result.iterations
        )));
    }
    tracing::trace!(
        iterations = result.iterations,
        log_likelihood = result.log_likelihood,
        "propensity logit converged"
    );

    check_interior(&result.predicted_probs)?;

    Ok(FittedPropensity {
        scores: result.predicted_probs,
        model: PropensityModel {
            coefficients: result.coefficients,
            kept_columns,
            kept_names,
            dropped_names,
            iterations: result.iterations,
        },
    })
}

fn check_interior(scores: &DVector<f64>) -> Result<(), IpswError> {
    match scores.iter().position(|&q| !(q > 0.0 && q < 1.0)) {
        Some(row) => Err(IpswError::Fit(format!(
            "Propensity score {} at row {} is not strictly between 0 and 1",
            scores[row], row
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with(z: Vec<f64>, covariate: Vec<f64>, duplicate: bool) -> IvData {
        let n = z.len();
        let mut names = vec!["intercept".to_string(), "w".to_string()];
        let x = if duplicate {
            names.push("w_copy".to_string());
            DMatrix::from_fn(n, 3, |i, j| if j == 0 { 1.0 } else { covariate[i] })
        } else {
            DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { covariate[i] })
        };
        IvData::new(
            DVector::from_element(n, 1.0),
            DVector::from_element(n, 0.0),
            DVector::from_vec(z),
            x,
            names,
        )
        .unwrap()
    }

    #[test]
    fn test_rank_deficient_design_still_fits() {
        let z = vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0];
        let w = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let full = fit_propensity(&data_with(z.clone(), w.clone(), false), &Default::default())
            .unwrap();
        let deficient =
            fit_propensity(&data_with(z, w, true), &Default::default()).unwrap();

        assert_eq!(deficient.model().dropped_names(), &vec!["w_copy".to_string()]);
        for (a, b) in full.scores().iter().zip(deficient.scores().iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_perfect_separation_is_a_fit_error() {
        let z = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let w = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = fit_propensity(&data_with(z, w, false), &Default::default());
        assert!(matches!(result, Err(IpswError::Fit(_))));
    }

    #[test]
    fn test_predict_reproduces_fitted_scores() {
        let z = vec![1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let w = vec![0.5, 1.5, 2.0, 0.1, 3.0, 2.5, 1.0, 0.7];
        let data = data_with(z, w, true);
        let fitted = fit_propensity(&data, &Default::default()).unwrap();
        let predicted = fitted.model().predict(data.x());
        assert!((predicted - fitted.scores()).norm() < 1e-12);
    }

    #[test]
    fn test_from_scores_rejects_boundary() {
        let scores = DVector::from_vec(vec![0.2, 1.0]);
        assert!(matches!(
            FittedPropensity::from_scores(scores),
            Err(IpswError::Fit(msg)) if msg.contains("row 1")
        ));
    }

    #[test]
    fn test_overlap_summary_counts_extremes() {
        let fitted =
            FittedPropensity::from_scores(DVector::from_vec(vec![0.005, 0.5, 0.995, 0.3]))
                .unwrap();
        let overlap = fitted.overlap();
        assert_eq!(overlap.n_extreme, 2);
        assert_eq!(overlap.min, 0.005);
        assert_eq!(overlap.max, 0.995);
    }
}
