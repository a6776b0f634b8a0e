//! ndarray-accelerated host backend.
//!
//! Dense matrix products and reductions go through ndarray (which threads
//! its own matrixmultiply kernels); the transcendental activation kernels
//! share the reference scalar code, exactly as a vendor-BLAS build would
//! keep its own exp/log loops.

use ndarray::{ArrayView2, ArrayViewMut2, Axis};

use super::cpu::{
    log_floor_scalar, sigmoid_scalar, softmax_rows_scalar, softplus_scalar, tanh_scalar,
};
use super::{gemm_dims, require, MathBackend};
use crate::tensor::Tensor;

/// Vendor-math-library backend over ndarray.
#[derive(Debug, Clone, Copy)]
pub struct VendorBackend {
    validate: bool,
}

impl VendorBackend {
    /// Create a vendor backend; `validate` enables fatal dimension checking.
    pub fn new(validate: bool) -> Self {
        Self { validate }
    }
}

fn view(t: &Tensor) -> ArrayView2<'_, f32> {
    ArrayView2::from_shape((t.rows(), t.cols()), t.host()).expect("tensor buffer covers its shape")
}

fn view_mut(t: &mut Tensor) -> ArrayViewMut2<'_, f32> {
    let (rows, cols) = (t.rows(), t.cols());
    ArrayViewMut2::from_shape((rows, cols), t.host_mut())
        .expect("tensor buffer covers its shape")
}

impl MathBackend for VendorBackend {
    fn name(&self) -> &'static str {
        "vendor"
    }

    fn stage(&self, _t: &mut Tensor) {}

    fn fetch(&self, _t: &mut Tensor) {}

    fn copy(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "copy: length");
        dst.host_mut().copy_from_slice(src.host());
    }

    fn add(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "add: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d += s;
        }
    }

    fn sub(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "sub: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d -= s;
        }
    }

    fn mul(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "mul: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d *= s;
        }
    }

    fn scaled_add(&self, scale: f32, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "scaled_add: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = scale * *d + s;
        }
    }

    fn axpy(&self, alpha: f32, x: &Tensor, y: &mut Tensor) {
        require(self.validate, x.len() == y.len(), "axpy: length");
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
        view_mut(dst).mapv_inplace(|x| x * alpha);
    }

    fn clip(&self, lo: f32, hi: f32, dst: &mut Tensor) {
        view_mut(dst).mapv_inplace(|x| x.clamp(lo, hi));
    }

    fn shift(&self, delta: f32, dst: &mut Tensor) {
        view_mut(dst).mapv_inplace(|x| x + delta);
    }

    fn fill(&self, value: f32, dst: &mut Tensor) {
        view_mut(dst).fill(value);
    }

    fn clear(&self, dst: &mut Tensor) {
        view_mut(dst).fill(0.0);
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
        let _ = gemm_dims(self.validate, trans_a, trans_b, a, b, c);
        let a_view = view(a);
        let b_view = view(b);
        let op_a = if trans_a { a_view.t() } else { a_view.view() };
        let op_b = if trans_b { b_view.t() } else { b_view.view() };
        let product = op_a.dot(&op_b);
        let mut c_view = view_mut(c);
        c_view.zip_mut_with(&product, |cv, &p| *cv = alpha * p + beta * *cv);
    }

    fn col_sum(&self, src: &Tensor, dst: &mut Tensor, accumulate: bool) {
        require(self.validate, dst.len() == src.cols(), "col_sum: width");
        let sums = view(src).sum_axis(Axis(0));
        let dst_host = dst.host_mut();
        if accumulate {
            for (d, &s) in dst_host.iter_mut().zip(sums.iter()) {
                *d += s;
            }
        } else {
            for (d, &s) in dst_host.iter_mut().zip(sums.iter()) {
                *d = s;
            }
        }
    }

    fn row_argmax(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, dst.len() == src.rows(), "row_argmax: height");
        for (d, row) in dst.host_mut().iter_mut().zip(view(src).axis_iter(Axis(0))) {
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
        let bias_host = bias.host();
        for (i, (d, row)) in
            dst.host_mut().iter_mut().zip(view(w).axis_iter(Axis(0))).enumerate()
        {
            *d = row.iter().map(|&x| x * x).sum::<f32>() + bias_host[i] * bias_host[i];
        }
    }

    fn accumulate_square(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "accumulate_square: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d += s * s;
        }
    }

    fn adagrad_rate(&self, eta: f32, k: f32, sumsq: &Tensor, dst: &mut Tensor) {
        require(self.validate, sumsq.len() == dst.len(), "adagrad_rate: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(sumsq.host()) {
            *d = eta / (k + s).sqrt();
        }
    }

    fn relu(&self, neg_slope: f32, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "relu: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = if s > 0.0 { s } else { neg_slope * s };
        }
    }

    fn relu_backward(&self, neg_slope: f32, y: &Tensor, dy: &mut Tensor) {
        require(self.validate, y.len() == dy.len(), "relu_backward: length");
        for (d, &yv) in dy.host_mut().iter_mut().zip(y.host()) {
            if yv <= 0.0 {
                *d *= neg_slope;
            }
        }
    }

    fn sigmoid(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "sigmoid: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = sigmoid_scalar(s);
        }
    }

    fn tanh(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "tanh: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = tanh_scalar(s);
        }
    }

    fn softplus(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "softplus: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = softplus_scalar(s);
        }
    }

    fn softmax_rows(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "softmax_rows: length");
        softmax_rows_scalar(src.rows(), src.cols(), src.host(), dst.host_mut());
    }

    fn log_floor(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "log_floor: length");
        for (d, &s) in dst.host_mut().iter_mut().zip(src.host()) {
            *d = log_floor_scalar(s);
        }
    }
}
