//! Backend-agnostic numeric kernel layer.
//!
//! Every vector/matrix primitive used by the training core goes through the
//! [`MathBackend`] trait, so the same training code runs on plain CPU loops,
//! the ndarray-accelerated vendor path, or CUDA kernels. The implementation
//! is selected once at process start from [`BackendOptions`] and never mixed
//! within one run.
//!
//! All operations work on the logical `rows x cols` prefix of each tensor's
//! buffer; dimension validation is a construction-time toggle, off by
//! default. A failed check with validation enabled is fatal.

mod cpu;
mod vendor;

#[cfg(feature = "cuda")]
mod cuda;
#[cfg(feature = "cuda")]
pub(crate) mod gpu_buf;

pub use cpu::CpuBackend;
pub use vendor::VendorBackend;

#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;

use crate::tensor::Tensor;

/// Largest argument fed to `exp` by the activation kernels; `exp(87.33)` is
/// just below `f32::MAX`.
pub const MAX_EXP_ARG: f32 = 87.33;

/// Log value standing in for log(0).
pub const LOG_ZERO: f32 = -1.0e10;

/// Floor for finite log results.
pub const LOG_SMALL: f32 = -0.5e10;

/// Smallest input whose log is computed rather than floored to [`LOG_ZERO`].
pub const MIN_LOG_ARG: f32 = 1.0e-37;

/// Which kernel implementation backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Plain loops; the reference semantics.
    Cpu,
    /// ndarray-accelerated host path (threaded matrix products).
    Vendor,
    /// CUDA device kernels; tensors must be explicitly synchronized.
    #[cfg(feature = "cuda")]
    Cuda,
}

/// Backend selection and validation options, fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct BackendOptions {
    pub kind: BackendKind,
    /// Enable dimension checking on every call. Off by default.
    pub validate_dims: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self { kind: BackendKind::Cpu, validate_dims: false }
    }
}

impl BackendOptions {
    /// Options for the given kind with validation off.
    pub fn new(kind: BackendKind) -> Self {
        Self { kind, validate_dims: false }
    }

    /// Enable or disable dimension checking.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_dims = validate;
        self
    }
}

/// Instantiate the backend chosen by `options`.
pub fn create(options: &BackendOptions) -> Box<dyn MathBackend> {
    match options.kind {
        BackendKind::Cpu => Box::new(CpuBackend::new(options.validate_dims)),
        BackendKind::Vendor => Box::new(VendorBackend::new(options.validate_dims)),
        #[cfg(feature = "cuda")]
        BackendKind::Cuda => Box::new(CudaBackend::new(options.validate_dims)),
    }
}

/// Dense numeric primitives over [`Tensor`] logical shapes.
///
/// Element-wise operations require identical logical lengths; matrix
/// operations derive `m, n, k` from the logical shapes. Implementations may
/// parallelize internally but are synchronous from the caller's point of
/// view.
pub trait MathBackend {
    /// Implementation name for diagnostics.
    fn name(&self) -> &'static str;

    /// Make `t`'s backing store ready for this backend's kernels
    /// (host-to-device upload where applicable; a no-op on host backends).
    fn stage(&self, t: &mut Tensor);

    /// Make `t`'s host buffer current (device-to-host download where
    /// applicable; a no-op on host backends).
    fn fetch(&self, t: &mut Tensor);

    /// `dst <- src`
    fn copy(&self, src: &Tensor, dst: &mut Tensor);
    /// `dst += src`
    fn add(&self, src: &Tensor, dst: &mut Tensor);
    /// `dst -= src`
    fn sub(&self, src: &Tensor, dst: &mut Tensor);
    /// `dst *= src` element-wise
    fn mul(&self, src: &Tensor, dst: &mut Tensor);
    /// `dst = scale * dst + src`
    fn scaled_add(&self, scale: f32, src: &Tensor, dst: &mut Tensor);
    /// `y += alpha * x`
    fn axpy(&self, alpha: f32, x: &Tensor, y: &mut Tensor);
    /// Duplicate the single-row `row` into every row of `dst`.
    fn broadcast_row(&self, row: &Tensor, dst: &mut Tensor);
    /// `dst *= alpha`
    fn scale(&self, alpha: f32, dst: &mut Tensor);
    /// Clamp every element of `dst` into `[lo, hi]`.
    fn clip(&self, lo: f32, hi: f32, dst: &mut Tensor);
    /// `dst += delta` element-wise
    fn shift(&self, delta: f32, dst: &mut Tensor);
    /// Set every element of `dst` to `value`.
    fn fill(&self, value: f32, dst: &mut Tensor);
    /// Set every element of `dst` to zero.
    fn clear(&self, dst: &mut Tensor);

    /// `C = alpha * op(A) . op(B) + beta * C`
    ///
    /// Supported transpose combinations are NN, NT and TN; requesting both
    /// transposed is a contract violation.
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        trans_a: bool,
        trans_b: bool,
        alpha: f32,
        a: &Tensor,
        b: &Tensor,
        beta: f32,
        c: &mut Tensor,
    );

    /// Sum `src`'s rows into the single-row `dst`; adds into `dst` when
    /// `accumulate` is set, otherwise overwrites.
    fn col_sum(&self, src: &Tensor, dst: &mut Tensor, accumulate: bool);
    /// Per-row index of the maximum element, stored as `f32` in the
    /// single-row `dst` (one entry per row of `src`).
    fn row_argmax(&self, src: &Tensor, dst: &mut Tensor);
    /// `dst[i] = sum_j w[i][j]^2 + bias[i]^2` for each row `i`.
    fn row_norm_sq(&self, w: &Tensor, bias: &Tensor, dst: &mut Tensor);
    /// `dst += src * src` element-wise (squared-gradient accumulator).
    fn accumulate_square(&self, src: &Tensor, dst: &mut Tensor);
    /// `dst = eta / sqrt(k + sumsq)` element-wise (per-parameter rate).
    fn adagrad_rate(&self, eta: f32, k: f32, sumsq: &Tensor, dst: &mut Tensor);

    /// Leaky ReLU: `dst = src > 0 ? src : neg_slope * src`.
    fn relu(&self, neg_slope: f32, src: &Tensor, dst: &mut Tensor);
    /// Scale `dy` by the leaky-ReLU derivative taken at activation output `y`.
    fn relu_backward(&self, neg_slope: f32, y: &Tensor, dy: &mut Tensor);
    /// Logistic sigmoid with overflow-guarded exponent.
    fn sigmoid(&self, src: &Tensor, dst: &mut Tensor);
    /// Hyperbolic tangent with overflow-guarded exponent.
    fn tanh(&self, src: &Tensor, dst: &mut Tensor);
    /// Softplus `ln(1 + e^x)` with overflow-guarded exponent.
    fn softplus(&self, src: &Tensor, dst: &mut Tensor);
    /// Row-wise softmax with max subtraction before exponentiation.
    fn softmax_rows(&self, src: &Tensor, dst: &mut Tensor);
    /// Natural log flooring non-positive inputs to [`LOG_ZERO`] and
    /// sub-threshold results to [`LOG_SMALL`].
    fn log_floor(&self, src: &Tensor, dst: &mut Tensor);
}

/// Fatal dimension check, active only when validation is enabled.
#[inline]
pub(crate) fn require(validate: bool, cond: bool, what: &str) {
    if validate && !cond {
        panic!("dimension check failed: {what}");
    }
}

/// Derive and validate gemm dimensions from logical shapes.
///
/// Returns `(m, n, k)` for `C[m x n] = op(A)[m x k] . op(B)[k x n]`.
pub(crate) fn gemm_dims(
    validate: bool,
    trans_a: bool,
    trans_b: bool,
    a: &Tensor,
    b: &Tensor,
    c: &Tensor,
) -> (usize, usize, usize) {
    assert!(!(trans_a && trans_b), "gemm: TT transpose combination is not supported");
    let m = c.rows();
    let n = c.cols();
    let k = if trans_a { a.rows() } else { a.cols() };
    let (am, ak) = if trans_a { (a.cols(), a.rows()) } else { (a.rows(), a.cols()) };
    let (bk, bn) = if trans_b { (b.cols(), b.rows()) } else { (b.rows(), b.cols()) };
    require(validate, am == m && ak == k, "gemm: op(A) shape");
    require(validate, bk == k && bn == n, "gemm: op(B) shape");
    (m, n, k)
}
