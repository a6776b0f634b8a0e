//! LU decomposition with scaled partial pivoting.
//!
//! Used for general (not necessarily positive-definite) determinants,
//! inverses and cofactor rows. Singularity is a soft failure: callers get
//! `None` (or a zero determinant) and decide for themselves, because a
//! determinant of zero is a legitimate answer in the cofactor paths.

use ndarray::Array2;

/// Packed LU factors of a square matrix.
struct Lu {
    /// L below the diagonal (unit diagonal implied), U on and above it.
    lu: Array2<f64>,
    /// Row permutation applied during pivoting.
    perm: Vec<usize>,
    /// +1 for an even number of row swaps, -1 for odd.
    sign: f64,
}

/// Decompose with scaled partial pivoting; `None` when a pivot underflows
/// to zero (singular matrix).
fn decompose(a: &Array2<f64>) -> Option<Lu> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "lu: matrix must be square");
    let mut lu = a.clone();
    let mut perm = vec![0usize; n];
    let mut sign = 1.0;

    // Implicit row scales for pivot comparison.
    let mut scale = vec![0.0f64; n];
    for i in 0..n {
        let big = (0..n).fold(0.0f64, |m, j| m.max(lu[[i, j]].abs()));
        if big == 0.0 {
            return None;
        }
        scale[i] = 1.0 / big;
    }

    for j in 0..n {
        for i in 0..j {
            let mut sum = lu[[i, j]];
            for k in 0..i {
                sum -= lu[[i, k]] * lu[[k, j]];
            }
            lu[[i, j]] = sum;
        }
        let mut big = 0.0;
        let mut pivot = j;
        for i in j..n {
            let mut sum = lu[[i, j]];
            for k in 0..j {
                sum -= lu[[i, k]] * lu[[k, j]];
            }
            lu[[i, j]] = sum;
            let weighted = scale[i] * sum.abs();
            if weighted >= big {
                big = weighted;
                pivot = i;
            }
        }
        if pivot != j {
            for k in 0..n {
                let tmp = lu[[pivot, k]];
                lu[[pivot, k]] = lu[[j, k]];
                lu[[j, k]] = tmp;
            }
            scale[pivot] = scale[j];
            sign = -sign;
        }
        perm[j] = pivot;
        if lu[[j, j]] == 0.0 {
            return None;
        }
        if j + 1 < n {
            let inv_pivot = 1.0 / lu[[j, j]];
            for i in (j + 1)..n {
                lu[[i, j]] *= inv_pivot;
            }
        }
    }
    Some(Lu { lu, perm, sign })
}

/// Solve `A x = b` in place against the packed factors.
fn solve(f: &Lu, b: &mut [f64]) {
    let n = f.perm.len();
    // Forward substitution with the permutation folded in.
    let mut first_nonzero = None;
    for i in 0..n {
        let p = f.perm[i];
        let mut sum = b[p];
        b[p] = b[i];
        if let Some(start) = first_nonzero {
            for k in start..i {
                sum -= f.lu[[i, k]] * b[k];
            }
        } else if sum != 0.0 {
            first_nonzero = Some(i);
        }
        b[i] = sum;
    }
    // Back substitution through U.
    for i in (0..n).rev() {
        let mut sum = b[i];
        for k in (i + 1)..n {
            sum -= f.lu[[i, k]] * b[k];
        }
        b[i] = sum / f.lu[[i, i]];
    }
}

/// Determinant via LU; zero when the matrix is singular.
pub fn lu_det(a: &Array2<f64>) -> f64 {
    match decompose(a) {
        Some(f) => (0..a.nrows()).fold(f.sign, |d, i| d * f.lu[[i, i]]),
        None => 0.0,
    }
}

/// Inverse and determinant via LU; `None` when the matrix is singular.
pub fn lu_invert(a: &Array2<f64>) -> Option<(Array2<f64>, f64)> {
    let n = a.nrows();
    let f = decompose(a)?;
    let det = (0..n).fold(f.sign, |d, i| d * f.lu[[i, i]]);

    let mut inv = Array2::<f64>::zeros((n, n));
    let mut col = vec![0.0f64; n];
    for j in 0..n {
        col.fill(0.0);
        col[j] = 1.0;
        solve(&f, &mut col);
        for i in 0..n {
            inv[[i, j]] = col[i];
        }
    }
    Some((inv, det))
}

/// Cofactors of row `row`: solve `A x = e_row` and scale by the determinant,
/// since `cof[row][j] = det(A) * A^{-1}[j][row]`. `None` when singular.
pub fn cofactor_row(a: &Array2<f64>, row: usize) -> Option<Vec<f64>> {
    let n = a.nrows();
    assert!(row < n, "cofactor_row: row {row} out of range for {n}x{n}");
    let f = decompose(a)?;
    let det = (0..n).fold(f.sign, |d, i| d * f.lu[[i, i]]);

    let mut x = vec![0.0f64; n];
    x[row] = 1.0;
    solve(&f, &mut x);
    for v in &mut x {
        *v *= det;
    }
    Some(x)
}
