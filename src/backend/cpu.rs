//! Plain-loop reference backend.
//!
//! Every other backend must match these semantics. The activation kernels
//! here are also reused by [`VendorBackend`](super::VendorBackend), which
//! only accelerates the dense linear-algebra paths.

use super::{gemm_dims, require, MathBackend, LOG_SMALL, LOG_ZERO, MAX_EXP_ARG, MIN_LOG_ARG};
use crate::tensor::Tensor;

/// Reference implementation: straightforward scalar loops.
#[derive(Debug, Clone, Copy)]
pub struct CpuBackend {
    validate: bool,
}

impl CpuBackend {
    /// Create a CPU backend; `validate` enables fatal dimension checking.
    pub fn new(validate: bool) -> Self {
        Self { validate }
    }
}

/// Overflow-guarded exponential: the argument is clamped to
/// `[-MAX_EXP_ARG, MAX_EXP_ARG]` before `exp`.
#[inline]
pub(crate) fn safe_exp(x: f32) -> f32 {
    x.clamp(-MAX_EXP_ARG, MAX_EXP_ARG).exp()
}

#[inline]
pub(crate) fn sigmoid_scalar(x: f32) -> f32 {
    1.0 / (1.0 + safe_exp(-x))
}

#[inline]
pub(crate) fn tanh_scalar(x: f32) -> f32 {
    2.0 * sigmoid_scalar(2.0 * x) - 1.0
}

#[inline]
pub(crate) fn softplus_scalar(x: f32) -> f32 {
    (1.0 + safe_exp(x)).ln()
}

/// Floored natural log: non-positive or denormal-small inputs map to
/// `LOG_ZERO`; finite results are floored at `LOG_SMALL`.
#[inline]
pub(crate) fn log_floor_scalar(x: f32) -> f32 {
    if x < MIN_LOG_ARG {
        LOG_ZERO
    } else {
        x.ln().max(LOG_SMALL)
    }
}

/// Row-wise softmax into `dst`, max-subtracted for stability.
pub(crate) fn softmax_rows_scalar(rows: usize, cols: usize, src: &[f32], dst: &mut [f32]) {
    for r in 0..rows {
        let row = &src[r * cols..(r + 1) * cols];
        let out = &mut dst[r * cols..(r + 1) * cols];
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for (o, &x) in out.iter_mut().zip(row) {
            *o = safe_exp(x - max);
            sum += *o;
        }
        for o in out.iter_mut() {
            *o /= sum;
        }
    }
}

#[inline]
fn check_same_len(validate: bool, a: &Tensor, b: &Tensor, what: &str) {
    require(validate, a.len() == b.len(), what);
}

impl MathBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn stage(&self, _t: &mut Tensor) {}

    fn fetch(&self, _t: &mut Tensor) {}

    fn copy(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "copy: length");
        dst.host_mut().copy_from_slice(src.host());
    }

    fn add(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "add: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d += s;
        }
    }

    fn sub(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "sub: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d -= s;
        }
    }

    fn mul(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "mul: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d *= s;
        }
    }

    fn scaled_add(&self, scale: f32, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "scaled_add: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = scale * *d + s;
        }
    }

    fn axpy(&self, alpha: f32, x: &Tensor, y: &mut Tensor) {
        check_same_len(self.validate, x, y, "axpy: length");
        for (yv, &xv) in y.host_mut().iter_mut().zip(x.host()) {
            *yv += alpha * xv;
        }
    }

    fn broadcast_row(&self, row: &Tensor, dst: &mut Tensor) {
        require(self.validate, row.len() == dst.cols(), "broadcast_row: width");
        let cols = dst.cols();
        let src = row.host();
        for chunk in dst.host_mut().chunks_mut(cols) {
            chunk.copy_from_slice(&src[..cols]);
        }
    }

    fn scale(&self, alpha: f32, dst: &mut Tensor) {
        for d in dst.host_mut() {
            *d *= alpha;
        }
    }

    fn clip(&self, lo: f32, hi: f32, dst: &mut Tensor) {
        for d in dst.host_mut() {
            *d = d.clamp(lo, hi);
        }
    }

    fn shift(&self, delta: f32, dst: &mut Tensor) {
        for d in dst.host_mut() {
            *d += delta;
        }
    }

    fn fill(&self, value: f32, dst: &mut Tensor) {
        for d in dst.host_mut() {
            *d = value;
        }
    }

    fn clear(&self, dst: &mut Tensor) {
        self.fill(0.0, dst);
    }

    fn gemm(
        &self,
        trans_a: bool,
        trans_b: bool,
        alpha: f32,
        a: &Tensor,
        b: &Tensor,
        beta: f32,
        c: &mut Tensor,
    ) {
        let (m, n, k) = gemm_dims(self.validate, trans_a, trans_b, a, b, c);
        let (a_host, b_host) = (a.host(), b.host());
        let a_at = |i: usize, p: usize| {
            if trans_a {
                a_host[p * a.cols() + i]
            } else {
                a_host[i * a.cols() + p]
            }
        };
        let b_at = |p: usize, j: usize| {
            if trans_b {
                b_host[j * b.cols() + p]
            } else {
                b_host[p * b.cols() + j]
            }
        };
        let c_host = c.host_mut();
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0;
                for p in 0..k {
                    acc += a_at(i, p) * b_at(p, j);
                }
                let cell = &mut c_host[i * n + j];
                *cell = alpha * acc + beta * *cell;
            }
        }
    }

    fn col_sum(&self, src: &Tensor, dst: &mut Tensor, accumulate: bool) {
        require(self.validate, dst.len() == src.cols(), "col_sum: width");
        let cols = src.cols();
        let dst_host = dst.host_mut();
        if !accumulate {
            dst_host[..cols].fill(0.0);
        }
        for row in src.host().chunks(cols) {
            for (d, &s) in dst_host.iter_mut().zip(row) {
                *d += s;
            }
        }
    }

    fn row_argmax(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, dst.len() == src.rows(), "row_argmax: height");
        let cols = src.cols();
        for (d, row) in dst.host_mut().iter_mut().zip(src.host().chunks(cols)) {
            let mut best = 0usize;
            for (j, &x) in row.iter().enumerate() {
                if x > row[best] {
                    best = j;
                }
            }
            *d = best as f32;
        }
    }

    fn row_norm_sq(&self, w: &Tensor, bias: &Tensor, dst: &mut Tensor) {
        require(
            self.validate,
            bias.len() == w.rows() && dst.len() == w.rows(),
            "row_norm_sq: height",
        );
        let cols = w.cols();
        let bias_host = bias.host();
        for (i, (d, row)) in dst.host_mut().iter_mut().zip(w.host().chunks(cols)).enumerate() {
            let mut acc = bias_host[i] * bias_host[i];
            for &x in row {
                acc += x * x;
            }
            *d = acc;
        }
    }

    fn accumulate_square(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "accumulate_square: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d += s * s;
        }
    }

    fn adagrad_rate(&self, eta: f32, k: f32, sumsq: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, sumsq, dst, "adagrad_rate: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(sumsq.host()) {
            *d = eta / (k + s).sqrt();
        }
    }

    fn relu(&self, neg_slope: f32, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "relu: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = if s > 0.0 { s } else { neg_slope * s };
        }
    }

    fn relu_backward(&self, neg_slope: f32, y: &Tensor, dy: &mut Tensor) {
        check_same_len(self.validate, y, dy, "relu_backward: length");
        for (d, &yv) in dy.host_mut().iter_mut().zip(y.host()) {
            if yv <= 0.0 {
                *d *= neg_slope;
            }
        }
    }

    fn sigmoid(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "sigmoid: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = sigmoid_scalar(s);
        }
    }

    fn tanh(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "tanh: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = tanh_scalar(s);
        }
    }

    fn softplus(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "softplus: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = softplus_scalar(s);
        }
    }

    fn softmax_rows(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "softmax_rows: length");
        softmax_rows_scalar(src.rows(), src.cols(), src.host(), dst.host_mut());
    }

    fn log_floor(&self, src: &Tensor, dst: &mut Tensor) {
        check_same_len(self.validate, src, dst, "log_floor: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = log_floor_scalar(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn backend() -> CpuBackend {
        CpuBackend::new(true)
    }

    fn t(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), 1, values.len())
    }

    #[test]
    fn test_copy_add_sub_mul() {
        let b = backend();
        let src = t(&[1.0, 2.0, 3.0]);
        let mut dst = t(&[10.0, 20.0, 30.0]);

        b.add(&src, &mut dst);
        assert_eq!(dst.host(), &[11.0, 22.0, 33.0]);

        b.sub(&src, &mut dst);
        assert_eq!(dst.host(), &[10.0, 20.0, 30.0]);

        b.mul(&src, &mut dst);
        assert_eq!(dst.host(), &[10.0, 40.0, 90.0]);

        b.copy(&src, &mut dst);
        assert_eq!(dst.host(), src.host());
    }

    #[test]
    fn test_scaled_add() {
        let b = backend();
        let src = t(&[1.0, 1.0]);
        let mut dst = t(&[2.0, 4.0]);
        // dst = 0.5*dst + src
        b.scaled_add(0.5, &src, &mut dst);
        assert_eq!(dst.host(), &[2.0, 3.0]);
    }

    #[test]
    fn test_axpy() {
        let b = backend();
        let x = t(&[1.0, 2.0]);
        let mut y = t(&[10.0, 10.0]);
        b.axpy(-2.0, &x, &mut y);
        assert_eq!(y.host(), &[8.0, 6.0]);
    }

    #[test]
    fn test_broadcast_row() {
        let b = backend();
        let row = t(&[1.0, 2.0]);
        let mut dst = Tensor::new(3, 2);
        b.broadcast_row(&row, &mut dst);
        assert_eq!(dst.host(), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_scale_clip_shift_fill() {
        let b = backend();
        let mut dst = t(&[-4.0, 1.0, 5.0]);
        b.scale(0.5, &mut dst);
        assert_eq!(dst.host(), &[-2.0, 0.5, 2.5]);
        b.clip(-1.0, 1.0, &mut dst);
        assert_eq!(dst.host(), &[-1.0, 0.5, 1.0]);
        b.shift(1.0, &mut dst);
        assert_eq!(dst.host(), &[0.0, 1.5, 2.0]);
        b.fill(7.0, &mut dst);
        assert_eq!(dst.host(), &[7.0, 7.0, 7.0]);
        b.clear(&mut dst);
        assert_eq!(dst.host(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gemm_nn() {
        let b = backend();
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let x = Tensor::from_vec(vec![5.0, 6.0, 7.0, 8.0], 2, 2);
        let mut c = Tensor::new(2, 2);
        b.gemm(false, false, 1.0, &a, &x, 0.0, &mut c);
        // [[1,2],[3,4]] . [[5,6],[7,8]] = [[19,22],[43,50]]
        assert_eq!(c.host(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_gemm_nt_and_tn_match_explicit_transpose() {
        let b = backend();
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        let x = Tensor::from_vec(vec![1.0, 0.0, 2.0, 1.0, 0.0, 3.0], 2, 3);

        // NT: C[2x2] = A[2x3] . X^T[3x2]
        let mut c_nt = Tensor::new(2, 2);
        b.gemm(false, true, 1.0, &a, &x, 0.0, &mut c_nt);
        // Rows of A dotted with rows of X.
        assert_eq!(c_nt.host(), &[7.0, 10.0, 16.0, 22.0]);

        // TN: C[3x3] = A^T[3x2] . X[2x3]
        let mut c_tn = Tensor::new(3, 3);
        b.gemm(true, false, 1.0, &a, &x, 0.0, &mut c_tn);
        assert_eq!(c_tn.host()[0], 1.0 * 1.0 + 4.0 * 1.0);
        assert_eq!(c_tn.host()[8], 3.0 * 2.0 + 6.0 * 3.0 * 1.0);
    }

    #[test]
    fn test_gemm_alpha_beta() {
        let b = backend();
        let a = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], 2, 2);
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let mut c = Tensor::from_vec(vec![10.0, 10.0, 10.0, 10.0], 2, 2);
        // C = 2*I.X + 0.5*C
        b.gemm(false, false, 2.0, &a, &x, 0.5, &mut c);
        assert_eq!(c.host(), &[7.0, 9.0, 11.0, 13.0]);
    }

    #[test]
    fn test_col_sum_overwrite_and_accumulate() {
        let b = backend();
        let src = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
        let mut dst = t(&[100.0, 100.0]);
        b.col_sum(&src, &mut dst, false);
        assert_eq!(dst.host(), &[9.0, 12.0]);
        b.col_sum(&src, &mut dst, true);
        assert_eq!(dst.host(), &[18.0, 24.0]);
    }

    #[test]
    fn test_row_argmax() {
        let b = backend();
        let src = Tensor::from_vec(vec![0.1, 0.9, 0.0, 0.7, 0.2, 0.1], 2, 3);
        let mut dst = t(&[0.0, 0.0]);
        b.row_argmax(&src, &mut dst);
        assert_eq!(dst.host(), &[1.0, 0.0]);
    }

    #[test]
    fn test_row_argmax_ties_take_first() {
        let b = backend();
        let src = Tensor::from_vec(vec![0.5, 0.5, 0.5], 1, 3);
        let mut dst = t(&[9.0]);
        b.row_argmax(&src, &mut dst);
        assert_eq!(dst.host(), &[0.0]);
    }

    #[test]
    fn test_row_norm_sq() {
        let b = backend();
        let w = Tensor::from_vec(vec![3.0, 4.0, 1.0, 0.0], 2, 2);
        let bias = t(&[0.0, 2.0]);
        let mut dst = t(&[0.0, 0.0]);
        b.row_norm_sq(&w, &bias, &mut dst);
        assert_eq!(dst.host(), &[25.0, 5.0]);
    }

    #[test]
    fn test_accumulate_square() {
        let b = backend();
        let src = t(&[2.0, -3.0]);
        let mut dst = t(&[1.0, 1.0]);
        b.accumulate_square(&src, &mut dst);
        assert_eq!(dst.host(), &[5.0, 10.0]);
    }

    #[test]
    fn test_adagrad_rate() {
        let b = backend();
        let sumsq = t(&[0.0, 3.0, 99.0]);
        let mut dst = t(&[0.0, 0.0, 0.0]);
        b.adagrad_rate(0.1, 1.0, &sumsq, &mut dst);
        assert_abs_diff_eq!(dst.host()[0], 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(dst.host()[1], 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(dst.host()[2], 0.01, epsilon = 1e-6);
    }

    #[test]
    fn test_relu_leaky() {
        let b = backend();
        let src = t(&[-1.0, 0.0, 2.0]);
        let mut dst = t(&[0.0, 0.0, 0.0]);
        b.relu(0.01, &src, &mut dst);
        assert_abs_diff_eq!(dst.host()[0], -0.01, epsilon = 1e-7);
        assert_abs_diff_eq!(dst.host()[1], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(dst.host()[2], 2.0, epsilon = 1e-7);
    }

    #[test]
    fn test_relu_backward_scales_nonpositive() {
        let b = backend();
        let y = t(&[-0.01, 0.0, 2.0]);
        let mut dy = t(&[1.0, 1.0, 1.0]);
        b.relu_backward(0.01, &y, &mut dy);
        assert_abs_diff_eq!(dy.host()[0], 0.01, epsilon = 1e-7);
        assert_abs_diff_eq!(dy.host()[1], 0.01, epsilon = 1e-7);
        assert_abs_diff_eq!(dy.host()[2], 1.0, epsilon = 1e-7);
    }

    #[test]
    fn test_sigmoid_at_zero() {
        let b = backend();
        let src = t(&[0.0]);
        let mut dst = t(&[0.0]);
        b.sigmoid(&src, &mut dst);
        assert_abs_diff_eq!(dst.host()[0], 0.5, epsilon = 1e-7);
    }

    #[test]
    fn test_sigmoid_extreme_inputs_do_not_overflow() {
        let b = backend();
        let src = t(&[-1000.0, 1000.0]);
        let mut dst = t(&[0.0, 0.0]);
        b.sigmoid(&src, &mut dst);
        assert!(dst.host()[0].is_finite());
        assert!(dst.host()[1].is_finite());
        assert!(dst.host()[0] < 1e-6);
        assert!(dst.host()[1] > 1.0 - 1e-6);
    }

    #[test]
    fn test_tanh_matches_std() {
        let b = backend();
        let src = t(&[-1.0, 0.0, 0.5]);
        let mut dst = t(&[0.0, 0.0, 0.0]);
        b.tanh(&src, &mut dst);
        for (got, &x) in dst.host().iter().zip(src.host()) {
            assert_abs_diff_eq!(*got, x.tanh(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_softplus() {
        let b = backend();
        let src = t(&[0.0, 1.0]);
        let mut dst = t(&[0.0, 0.0]);
        b.softplus(&src, &mut dst);
        assert_abs_diff_eq!(dst.host()[0], std::f32::consts::LN_2, epsilon = 1e-6);
        assert_abs_diff_eq!(dst.host()[1], (1.0f32 + std::f32::consts::E).ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_softmax_known_values() {
        let b = backend();
        let src = t(&[1.0, 2.0, 3.0]);
        let mut dst = t(&[0.0, 0.0, 0.0]);
        b.softmax_rows(&src, &mut dst);
        assert_abs_diff_eq!(dst.host()[0], 0.0900, epsilon = 1e-4);
        assert_abs_diff_eq!(dst.host()[1], 0.2447, epsilon = 1e-4);
        assert_abs_diff_eq!(dst.host()[2], 0.6652, epsilon = 1e-4);
    }

    #[test]
    fn test_softmax_rows_sum_to_one_with_large_inputs() {
        let b = backend();
        let src = Tensor::from_vec(vec![1000.0, 1001.0, 999.0, -5.0, 0.0, 5.0], 2, 3);
        let mut dst = Tensor::new(2, 3);
        b.softmax_rows(&src, &mut dst);
        for row in dst.host().chunks(3) {
            let sum: f32 = row.iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-5);
            assert!(row.iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn test_log_floor() {
        let b = backend();
        let src = t(&[-1.0, 0.0, 1.0, std::f32::consts::E]);
        let mut dst = t(&[0.0, 0.0, 0.0, 0.0]);
        b.log_floor(&src, &mut dst);
        assert_eq!(dst.host()[0], LOG_ZERO);
        assert_eq!(dst.host()[1], LOG_ZERO);
        assert_abs_diff_eq!(dst.host()[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(dst.host()[3], 1.0, epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "dimension check failed")]
    fn test_validation_catches_length_mismatch() {
        let b = backend();
        let src = t(&[1.0, 2.0]);
        let mut dst = t(&[1.0, 2.0, 3.0]);
        b.add(&src, &mut dst);
    }

    #[test]
    fn test_validation_off_by_default() {
        // With validation disabled the same call must not panic; the op
        // works over the zip of the two prefixes.
        let b = CpuBackend::new(false);
        let src = t(&[1.0, 2.0]);
        let mut dst = t(&[1.0, 2.0, 3.0]);
        b.add(&src, &mut dst);
        assert_eq!(dst.host(), &[2.0, 4.0, 3.0]);
    }
}
