//! Host-resident dense linear algebra in `f64`.
//!
//! These routines back the model-space transform estimation paths: covariance
//! inversion via Cholesky, general determinants/inverses/cofactors via LU,
//! and a Golub-Reinsch SVD. They always run on the host in double precision
//! regardless of the selected kernel backend, and every decomposition takes
//! its input by reference and returns freshly owned outputs.

mod cholesky;
mod lu;
mod svd;

pub use cholesky::{cholesky_factor, cov_invert, cov_log_det};
pub use lu::{cofactor_row, lu_det, lu_invert};
pub use svd::{svd, Svd};

/// `|a|` carrying the sign of `b`.
#[inline]
pub(crate) fn copy_sign_of(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}
