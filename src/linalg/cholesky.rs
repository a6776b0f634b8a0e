//! Cholesky factorization for symmetric positive-definite covariances.
//!
//! A covariance that fails to factor is unusable for any downstream
//! estimation, so a non-positive pivot is fatal here, unlike the LU path
//! which reports singularity softly.

use ndarray::Array2;

/// Factor a symmetric positive-definite matrix into its lower-triangular
/// Cholesky factor `L` with `A = L . L^T`.
///
/// Only the lower triangle of `a` is read.
///
/// # Panics
/// Panics with "matrix not invertible" if a pivot is non-positive, i.e. the
/// matrix is not positive definite.
pub fn cholesky_factor(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "cholesky: matrix must be square");
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                assert!(sum > 0.0, "matrix not invertible");
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    l
}

/// Invert a symmetric positive-definite covariance and return
/// `(inverse, log_determinant)`.
///
/// The inverse is built one column at a time: for each unit vector `e_j`,
/// forward-substitute `L y = e_j` then back-substitute `L^T x = y`, which
/// gives column `j` of `A^{-1}`. The log-determinant falls out of the factor
/// as `2 * sum(ln L[i][i])`.
///
/// # Panics
/// Panics with "matrix not invertible" if `a` is not positive definite.
pub fn cov_invert(a: &Array2<f64>) -> (Array2<f64>, f64) {
    let n = a.nrows();
    let l = cholesky_factor(a);
    let log_det = 2.0 * (0..n).map(|i| l[[i, i]].ln()).sum::<f64>();

    let mut inv = Array2::<f64>::zeros((n, n));
    let mut y = vec![0.0f64; n];
    for j in 0..n {
        // L y = e_j
        for i in 0..n {
            let mut sum = if i == j { 1.0 } else { 0.0 };
            for k in 0..i {
                sum -= l[[i, k]] * y[k];
            }
            y[i] = sum / l[[i, i]];
        }
        // L^T x = y, written straight into column j
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n {
                sum -= l[[k, i]] * inv[[k, j]];
            }
            inv[[i, j]] = sum / l[[i, i]];
        }
    }
    (inv, log_det)
}

/// Log-determinant of a symmetric positive-definite covariance.
///
/// # Panics
/// Panics with "matrix not invertible" if `a` is not positive definite.
pub fn cov_log_det(a: &Array2<f64>) -> f64 {
    let l = cholesky_factor(a);
    2.0 * (0..a.nrows()).map(|i| l[[i, i]].ln()).sum::<f64>()
}
