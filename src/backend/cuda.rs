//! CUDA accelerator backend.
//!
//! Kernels live in `kernels/escuchar_kernels.cu` and are compiled by nvcc at
//! build time; matrix products go through cuBLAS. Every operation works on
//! the device-resident mirror of its tensors: callers must have staged each
//! operand (`stage`) beforehand, and host reads require an explicit `fetch`.
//! Nothing here transfers implicitly.

use std::ffi::c_void;

use super::{gemm_dims, require, MathBackend};
use crate::tensor::Tensor;

// Launch wrappers defined in kernels/escuchar_kernels.cu. All pointers are
// device memory; launches are synchronous with respect to the default stream.
extern "C" {
    fn esc_copy(src: *const f32, dst: *mut f32, n: i32);
    fn esc_add(src: *const f32, dst: *mut f32, n: i32);
    fn esc_sub(src: *const f32, dst: *mut f32, n: i32);
    fn esc_mul(src: *const f32, dst: *mut f32, n: i32);
    fn esc_scaled_add(scale: f32, src: *const f32, dst: *mut f32, n: i32);
    fn esc_axpy(alpha: f32, x: *const f32, y: *mut f32, n: i32);
    fn esc_broadcast_row(row: *const f32, dst: *mut f32, rows: i32, cols: i32);
    fn esc_scale(alpha: f32, dst: *mut f32, n: i32);
    fn esc_clip(lo: f32, hi: f32, dst: *mut f32, n: i32);
    fn esc_shift(delta: f32, dst: *mut f32, n: i32);
    fn esc_fill(value: f32, dst: *mut f32, n: i32);
    fn esc_col_sum(src: *const f32, dst: *mut f32, rows: i32, cols: i32, accumulate: i32);
    fn esc_row_argmax(src: *const f32, dst: *mut f32, rows: i32, cols: i32);
    fn esc_row_norm_sq(w: *const f32, bias: *const f32, dst: *mut f32, rows: i32, cols: i32);
    fn esc_accum_square(src: *const f32, dst: *mut f32, n: i32);
    fn esc_adagrad_rate(eta: f32, k: f32, sumsq: *const f32, dst: *mut f32, n: i32);
    fn esc_relu(neg_slope: f32, src: *const f32, dst: *mut f32, n: i32);
    fn esc_relu_backward(neg_slope: f32, y: *const f32, dy: *mut f32, n: i32);
    fn esc_sigmoid(src: *const f32, dst: *mut f32, n: i32);
    fn esc_tanh(src: *const f32, dst: *mut f32, n: i32);
    fn esc_softplus(src: *const f32, dst: *mut f32, n: i32);
    fn esc_softmax_rows(src: *const f32, dst: *mut f32, rows: i32, cols: i32);
    fn esc_log_floor(src: *const f32, dst: *mut f32, n: i32);
}

// Minimal cuBLAS v2 surface.
extern "C" {
    fn cublasCreate_v2(handle: *mut *mut c_void) -> i32;
    fn cublasDestroy_v2(handle: *mut c_void) -> i32;
    #[allow(clippy::too_many_arguments)]
    fn cublasSgemm_v2(
        handle: *mut c_void,
        transa: i32,
        transb: i32,
        m: i32,
        n: i32,
        k: i32,
        alpha: *const f32,
        a: *const f32,
        lda: i32,
        b: *const f32,
        ldb: i32,
        beta: *const f32,
        c: *mut f32,
        ldc: i32,
    ) -> i32;
}

const CUBLAS_OP_N: i32 = 0;
const CUBLAS_OP_T: i32 = 1;

/// Accelerator backend over raw CUDA kernels and cuBLAS.
#[derive(Debug)]
pub struct CudaBackend {
    validate: bool,
    handle: *mut c_void,
}

impl CudaBackend {
    /// Create the backend and its cuBLAS handle.
    ///
    /// # Panics
    /// Panics if no CUDA device is usable; backend selection happens once at
    /// process start and an unusable accelerator is not recoverable.
    pub fn new(validate: bool) -> Self {
        let mut handle: *mut c_void = std::ptr::null_mut();
        // SAFETY: handle is a valid out-parameter.
        let rc = unsafe { cublasCreate_v2(&mut handle) };
        assert_eq!(rc, 0, "cublasCreate failed with status {rc}; is a CUDA device present?");
        Self { validate, handle }
    }

    fn dev(t: &Tensor) -> *const f32 {
        t.device().expect("tensor not staged to device; call MathBackend::stage first").as_ptr()
    }

    fn dev_mut(t: &mut Tensor) -> *mut f32 {
        assert!(
            t.device().is_some(),
            "tensor not staged to device; call MathBackend::stage first"
        );
        t.device_mut().as_mut_ptr()
    }
}

impl Drop for CudaBackend {
    fn drop(&mut self) {
        // SAFETY: handle came from cublasCreate_v2 and is destroyed once.
        unsafe {
            cublasDestroy_v2(self.handle);
        }
    }
}

impl MathBackend for CudaBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn stage(&self, t: &mut Tensor) {
        t.sync_to_device();
    }

    fn fetch(&self, t: &mut Tensor) {
        t.sync_to_host();
    }

    fn copy(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "copy: length");
        unsafe { esc_copy(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn add(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "add: length");
        unsafe { esc_add(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn sub(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "sub: length");
        unsafe { esc_sub(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn mul(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "mul: length");
        unsafe { esc_mul(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn scaled_add(&self, scale: f32, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "scaled_add: length");
        unsafe { esc_scaled_add(scale, Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn axpy(&self, alpha: f32, x: &Tensor, y: &mut Tensor) {
        require(self.validate, x.len() == y.len(), "axpy: length");
        unsafe { esc_axpy(alpha, Self::dev(x), Self::dev_mut(y), x.len() as i32) }
    }

    fn broadcast_row(&self, row: &Tensor, dst: &mut Tensor) {
        require(self.validate, row.len() == dst.cols(), "broadcast_row: width");
        let (rows, cols) = (dst.rows() as i32, dst.cols() as i32);
        unsafe { esc_broadcast_row(Self::dev(row), Self::dev_mut(dst), rows, cols) }
    }

    fn scale(&self, alpha: f32, dst: &mut Tensor) {
        let n = dst.len() as i32;
        unsafe { esc_scale(alpha, Self::dev_mut(dst), n) }
    }

    fn clip(&self, lo: f32, hi: f32, dst: &mut Tensor) {
        let n = dst.len() as i32;
        unsafe { esc_clip(lo, hi, Self::dev_mut(dst), n) }
    }

    fn shift(&self, delta: f32, dst: &mut Tensor) {
        let n = dst.len() as i32;
        unsafe { esc_shift(delta, Self::dev_mut(dst), n) }
    }

    fn fill(&self, value: f32, dst: &mut Tensor) {
        let n = dst.len() as i32;
        unsafe { esc_fill(value, Self::dev_mut(dst), n) }
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
        // cuBLAS is column-major; compute C^T = op(B)^T . op(A)^T by
        // swapping the operands, which leaves row-major C in place.
        let op_a = if trans_a { CUBLAS_OP_T } else { CUBLAS_OP_N };
        let op_b = if trans_b { CUBLAS_OP_T } else { CUBLAS_OP_N };
        let lda = a.cols() as i32;
        let ldb = b.cols() as i32;
        let ldc = n as i32;
        let rc = unsafe {
            cublasSgemm_v2(
                self.handle,
                op_b,
                op_a,
                n as i32,
                m as i32,
                k as i32,
                &alpha,
                Self::dev(b),
                ldb,
                Self::dev(a),
                lda,
                &beta,
                Self::dev_mut(c),
                ldc,
            )
        };
        assert_eq!(rc, 0, "cublasSgemm failed with status {rc}");
    }

    fn col_sum(&self, src: &Tensor, dst: &mut Tensor, accumulate: bool) {
        require(self.validate, dst.len() == src.cols(), "col_sum: width");
        let (rows, cols) = (src.rows() as i32, src.cols() as i32);
        unsafe {
            esc_col_sum(Self::dev(src), Self::dev_mut(dst), rows, cols, i32::from(accumulate))
        }
    }

    fn row_argmax(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, dst.len() == src.rows(), "row_argmax: height");
        let (rows, cols) = (src.rows() as i32, src.cols() as i32);
        unsafe { esc_row_argmax(Self::dev(src), Self::dev_mut(dst), rows, cols) }
    }

    fn row_norm_sq(&self, w: &Tensor, bias: &Tensor, dst: &mut Tensor) {
        require(
            self.validate,
            bias.len() == w.rows() && dst.len() == w.rows(),
            "row_norm_sq: height",
        );
        let (rows, cols) = (w.rows() as i32, w.cols() as i32);
        unsafe { esc_row_norm_sq(Self::dev(w), Self::dev(bias), Self::dev_mut(dst), rows, cols) }
    }

    fn accumulate_square(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "accumulate_square: length");
        unsafe { esc_accum_square(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn adagrad_rate(&self, eta: f32, k: f32, sumsq: &Tensor, dst: &mut Tensor) {
        require(self.validate, sumsq.len() == dst.len(), "adagrad_rate: length");
        unsafe { esc_adagrad_rate(eta, k, Self::dev(sumsq), Self::dev_mut(dst), sumsq.len() as i32) }
    }

    fn relu(&self, neg_slope: f32, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "relu: length");
        unsafe { esc_relu(neg_slope, Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn relu_backward(&self, neg_slope: f32, y: &Tensor, dy: &mut Tensor) {
        require(self.validate, y.len() == dy.len(), "relu_backward: length");
        unsafe { esc_relu_backward(neg_slope, Self::dev(y), Self::dev_mut(dy), y.len() as i32) }
    }

    fn sigmoid(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "sigmoid: length");
        unsafe { esc_sigmoid(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn tanh(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "tanh: length");
        unsafe { esc_tanh(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn softplus(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "softplus: length");
        unsafe { esc_softplus(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }

    fn softmax_rows(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "softmax_rows: length");
        let (rows, cols) = (src.rows() as i32, src.cols() as i32);
        unsafe { esc_softmax_rows(Self::dev(src), Self::dev_mut(dst), rows, cols) }
    }

    fn log_floor(&self, src: &Tensor, dst: &mut Tensor) {
        require(self.validate, src.len() == dst.len(), "log_floor: length");
        unsafe { esc_log_floor(Self::dev(src), Self::dev_mut(dst), src.len() as i32) }
    }
}
