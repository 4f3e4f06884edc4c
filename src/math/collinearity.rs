//! Detection of linearly dependent design columns.
use nalgebra::{DMatrix, DVector};

/// Default relative tolerance below which a column counts as a linear
/// combination of the columns before it.
pub const DEFAULT_COLLINEARITY_TOL: f64 = 1e-10;

/// Returns the indices of a maximal set of linearly independent columns of `x`,
/// scanning left to right.
///
/// Each column is orthogonalised against the columns already kept (modified
/// Gram-Schmidt). It is kept when the norm of what remains exceeds `tol` times
/// its original norm. All-zero columns are always dropped. The first
/// column of a set of collinear columns wins, so an intercept placed first is
/// never dropped in favour of a covariate.
pub fn independent_columns(x: &DMatrix<f64>, tol: f64) -> Vec<usize> {
    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut kept = Vec::new();

    for j in 0..x.ncols() {
        let mut v = x.column(j).into_owned();
        let scale = v.norm();
        if scale == 0.0 || !scale.is_finite() {
            continue;
        }
        for q in &basis {
            let proj = q.dot(&v);
            v.axpy(-proj, q, 1.0);
        }
        let residual = v.norm();
        if residual > tol * scale {
            v /= residual;
            basis.push(v);
            kept.push(j);
        }
    }

    kept
}
