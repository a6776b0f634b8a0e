//! Golub-Reinsch singular value decomposition.
//!
//! Householder bidiagonalization accumulating both orthogonal factors,
//! followed by implicit-shift QR sweeps of Givens rotations until each
//! off-diagonal underflows against the bidiagonal norm. Singular values come
//! out non-negative (a negative value flips the matching row of `V^T`) but
//! in no particular order; callers that need a ranking sort the returned
//! triple themselves.

use ndarray::{Array1, Array2};

use super::copy_sign_of;

/// Result of [`svd`]: `a = u . diag(d) . vt`.
pub struct Svd {
    /// Column-orthogonal `rows x cols` factor.
    pub u: Array2<f64>,
    /// Singular values, non-negative, unsorted.
    pub d: Array1<f64>,
    /// Transposed orthogonal `cols x cols` factor.
    pub vt: Array2<f64>,
}

const MAX_SWEEPS: usize = 30;

/// Decompose `a` into `u . diag(d) . vt`.
///
/// Requires at least as many rows as columns.
///
/// # Panics
/// Panics if a sub-block fails to converge within 30 QR sweeps; such a
/// matrix cannot be decomposed by this routine and continuing would corrupt
/// every downstream estimate.
pub fn svd(a: &Array2<f64>) -> Svd {
    let m = a.nrows();
    let n = a.ncols();
    assert!(m >= n, "svd: need rows >= cols, got {m}x{n}");

    let mut u = a.clone();
    let mut v = Array2::<f64>::zeros((n, n));
    let mut w = Array1::<f64>::zeros(n);
    let mut rv1 = vec![0.0f64; n];

    // Householder reduction to bidiagonal form.
    let mut g = 0.0f64;
    let mut scale = 0.0f64;
    let mut anorm = 0.0f64;
    let mut l = 0usize;
    for i in 0..n {
        l = i + 1;
        rv1[i] = scale * g;
        g = 0.0;
        scale = 0.0;
        if i < m {
            for k in i..m {
                scale += u[[k, i]].abs();
            }
            if scale != 0.0 {
                let mut s = 0.0;
                for k in i..m {
                    u[[k, i]] /= scale;
                    s += u[[k, i]] * u[[k, i]];
                }
                let f = u[[i, i]];
                g = -copy_sign_of(s.sqrt(), f);
                let h = f * g - s;
                u[[i, i]] = f - g;
                for j in l..n {
                    let mut s = 0.0;
                    for k in i..m {
                        s += u[[k, i]] * u[[k, j]];
                    }
                    let f = s / h;
                    for k in i..m {
                        let delta = f * u[[k, i]];
                        u[[k, j]] += delta;
                    }
                }
                for k in i..m {
                    u[[k, i]] *= scale;
                }
            }
        }
        w[i] = scale * g;
        g = 0.0;
        scale = 0.0;
        if i < m && i != n - 1 {
            for k in l..n {
                scale += u[[i, k]].abs();
            }
            if scale != 0.0 {
                let mut s = 0.0;
                for k in l..n {
                    u[[i, k]] /= scale;
                    s += u[[i, k]] * u[[i, k]];
                }
                let f = u[[i, l]];
                g = -copy_sign_of(s.sqrt(), f);
                let h = f * g - s;
                u[[i, l]] = f - g;
                for k in l..n {
                    rv1[k] = u[[i, k]] / h;
                }
                for j in l..m {
                    let mut s = 0.0;
                    for k in l..n {
                        s += u[[j, k]] * u[[i, k]];
                    }
                    for k in l..n {
                        let delta = s * rv1[k];
                        u[[j, k]] += delta;
                    }
                }
                for k in l..n {
                    u[[i, k]] *= scale;
                }
            }
        }
        anorm = anorm.max(w[i].abs() + rv1[i].abs());
    }

    // Accumulate the right-hand transformations into V.
    for i in (0..n).rev() {
        if i < n - 1 {
            if g != 0.0 {
                // Double division avoids possible underflow.
                for j in l..n {
                    v[[j, i]] = (u[[i, j]] / u[[i, l]]) / g;
                }
                for j in l..n {
                    let mut s = 0.0;
                    for k in l..n {
                        s += u[[i, k]] * v[[k, j]];
                    }
                    for k in l..n {
                        let delta = s * v[[k, i]];
                        v[[k, j]] += delta;
                    }
                }
            }
            for j in l..n {
                v[[i, j]] = 0.0;
                v[[j, i]] = 0.0;
            }
        }
        v[[i, i]] = 1.0;
        g = rv1[i];
        l = i;
    }

    // Accumulate the left-hand transformations into U.
    for i in (0..n.min(m)).rev() {
        let l = i + 1;
        g = w[i];
        for j in l..n {
            u[[i, j]] = 0.0;
        }
        if g != 0.0 {
            g = 1.0 / g;
            for j in l..n {
                let mut s = 0.0;
                for k in l..m {
                    s += u[[k, i]] * u[[k, j]];
                }
                let f = (s / u[[i, i]]) * g;
                for k in i..m {
                    let delta = f * u[[k, i]];
                    u[[k, j]] += delta;
                }
            }
            for j in i..m {
                u[[j, i]] *= g;
            }
        } else {
            for j in i..m {
                u[[j, i]] = 0.0;
            }
        }
        u[[i, i]] += 1.0;
    }

    // Diagonalize the bidiagonal form: one implicit-shift QR sweep per
    // iteration over each trailing sub-block.
    for k in (0..n).rev() {
        for sweep in 0.. {
            // Find the split point: rv1[0] is always zero, so the scan
            // terminates with flag unset at the latest at l == 0.
            let mut flag = true;
            let mut l = k;
            let mut nm = 0usize;
            for candidate in (0..=k).rev() {
                l = candidate;
                nm = candidate.wrapping_sub(1);
                if rv1[l].abs() + anorm == anorm {
                    flag = false;
                    break;
                }
                if w[nm].abs() + anorm == anorm {
                    break;
                }
            }
            if flag {
                // Cancel rv1[l] with rotations applied to U.
                let mut c = 0.0;
                let mut s = 1.0;
                for i in l..=k {
                    let f = s * rv1[i];
                    rv1[i] *= c;
                    if f.abs() + anorm == anorm {
                        break;
                    }
                    g = w[i];
                    let h = f.hypot(g);
                    w[i] = h;
                    let inv_h = 1.0 / h;
                    c = g * inv_h;
                    s = -f * inv_h;
                    for j in 0..m {
                        let y = u[[j, nm]];
                        let z = u[[j, i]];
                        u[[j, nm]] = y * c + z * s;
                        u[[j, i]] = z * c - y * s;
                    }
                }
            }
            let z = w[k];
            if l == k {
                // Converged; make the singular value non-negative.
                if z < 0.0 {
                    w[k] = -z;
                    for j in 0..n {
                        v[[j, k]] = -v[[j, k]];
                    }
                }
                break;
            }
            assert!(sweep < MAX_SWEEPS, "svd: no convergence in {MAX_SWEEPS} iterations");

            // Shift from the trailing 2x2, then chase the bulge.
            let mut x = w[l];
            let nm = k - 1;
            let mut y = w[nm];
            g = rv1[nm];
            let mut h = rv1[k];
            let mut f = ((y - z) * (y + z) + (g - h) * (g + h)) / (2.0 * h * y);
            g = f.hypot(1.0);
            f = ((x - z) * (x + z) + h * ((y / (f + copy_sign_of(g, f))) - h)) / x;
            let mut c = 1.0;
            let mut s = 1.0;
            for j in l..=nm {
                let i = j + 1;
                g = rv1[i];
                y = w[i];
                h = s * g;
                g *= c;
                let mut zz = f.hypot(h);
                rv1[j] = zz;
                c = f / zz;
                s = h / zz;
                f = x * c + g * s;
                g = g * c - x * s;
                h = y * s;
                y *= c;
                for jj in 0..n {
                    let xv = v[[jj, j]];
                    let zv = v[[jj, i]];
                    v[[jj, j]] = xv * c + zv * s;
                    v[[jj, i]] = zv * c - xv * s;
                }
                zz = f.hypot(h);
                w[j] = zz;
                if zz != 0.0 {
                    let inv_z = 1.0 / zz;
                    c = f * inv_z;
                    s = h * inv_z;
                }
                f = c * g + s * y;
                x = c * y - s * g;
                for jj in 0..m {
                    let yv = u[[jj, j]];
                    let zv = u[[jj, i]];
                    u[[jj, j]] = yv * c + zv * s;
                    u[[jj, i]] = zv * c - yv * s;
                }
            }
            rv1[l] = 0.0;
            rv1[k] = f;
            w[k] = x;
        }
    }

    Svd { u, d: w, vt: v.reversed_axes() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;
    use proptest::prelude::*;

    fn reconstruct(s: &Svd) -> Array2<f64> {
        let n = s.d.len();
        let mut scaled = s.vt.clone();
        for i in 0..n {
            for j in 0..n {
                scaled[[i, j]] *= s.d[i];
            }
        }
        s.u.dot(&scaled)
    }

    #[test]
    fn test_diagonal_matrix() {
        let a = arr2(&[[3.0, 0.0], [0.0, 2.0]]);
        let s = svd(&a);
        let mut values: Vec<f64> = s.d.to_vec();
        values.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_abs_diff_eq!(values[0], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(values[1], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_reconstruction_square() {
        let a = arr2(&[[2.0, -1.0, 0.5], [1.0, 3.0, -2.0], [0.0, 1.5, 4.0]]);
        let s = svd(&a);
        let r = reconstruct(&s);
        for (x, y) in a.iter().zip(r.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_reconstruction_tall() {
        let a = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [-1.0, 0.5]]);
        let s = svd(&a);
        assert_eq!(s.u.dim(), (4, 2));
        assert_eq!(s.vt.dim(), (2, 2));
        let r = reconstruct(&s);
        for (x, y) in a.iter().zip(r.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_singular_values_non_negative() {
        let a = arr2(&[[0.0, -4.0], [-3.0, 0.0]]);
        let s = svd(&a);
        for &d in s.d.iter() {
            assert!(d >= 0.0, "singular value {d} is negative");
        }
    }

    #[test]
    fn test_orthogonality() {
        let a = arr2(&[[2.0, -1.0], [1.0, 3.0], [0.5, 0.5]]);
        let s = svd(&a);
        let utu = s.u.t().dot(&s.u);
        let vvt = s.vt.dot(&s.vt.t());
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(utu[[i, j]], expected, epsilon = 1e-10);
                assert_abs_diff_eq!(vvt[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_rank_deficient_matrix() {
        // Second row is a multiple of the first: one singular value is zero.
        let a = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        let s = svd(&a);
        let mut values: Vec<f64> = s.d.to_vec();
        values.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_abs_diff_eq!(values[0], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(values[1], 5.0, epsilon = 1e-10);
    }

    proptest! {
        #[test]
        fn prop_reconstruction(values in prop::collection::vec(-5.0f64..5.0, 9)) {
            let a = Array2::from_shape_vec((3, 3), values).unwrap();
            let s = svd(&a);
            let r = reconstruct(&s);
            for (x, y) in a.iter().zip(r.iter()) {
                prop_assert!((x - y).abs() < 1e-8, "reconstruction off: {x} vs {y}");
            }
            for &d in s.d.iter() {
                prop_assert!(d >= 0.0);
            }
        }
    }
}
