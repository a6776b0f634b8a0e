//! Trainable parameter blocks and their per-parameter accumulators.
//!
//! The network owns these; the update engine and the schedulers only mutate
//! them through the backend kernels.

use crate::tensor::Tensor;

/// One trainable tensor together with its optimizer state.
///
/// `grad_sq_sum` is cumulative across the whole run and never reset; the
/// adaptive-rate schedulers rely on it being monotonically non-decreasing.
#[derive(Clone, Debug, Default)]
pub struct ParamBlock {
    /// Live parameter values.
    pub value: Tensor,
    /// Accumulated gradient for the current update window.
    pub grad: Tensor,
    /// Running sum of squared gradients.
    pub grad_sq_sum: Tensor,
    /// Momentum/update buffer blended across updates.
    pub update: Tensor,
    /// Precomputed per-parameter rate, filled by adaptive schedulers.
    pub adaptive_rate: Tensor,
}

impl ParamBlock {
    /// Zero-initialized block of the given shape.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            value: Tensor::new(rows, cols),
            grad: Tensor::new(rows, cols),
            grad_sq_sum: Tensor::new(rows, cols),
            update: Tensor::new(rows, cols),
            adaptive_rate: Tensor::new(rows, cols),
        }
    }

    /// Block initialized from existing values, accumulators zeroed.
    pub fn from_values(value: Tensor) -> Self {
        let (rows, cols) = (value.rows(), value.cols());
        Self {
            value,
            grad: Tensor::new(rows, cols),
            grad_sq_sum: Tensor::new(rows, cols),
            update: Tensor::new(rows, cols),
            adaptive_rate: Tensor::new(rows, cols),
        }
    }
}

/// Weight and bias blocks for one layer.
///
/// `depth` is the layer's distance from the output, which drives the
/// geometric shrink of the gradient-clipping bound. The update flags let a
/// layer be frozen selectively; a block with its flag unset is untouched by
/// every update path.
#[derive(Clone, Debug)]
pub struct LayerParameters {
    pub weight: ParamBlock,
    pub bias: ParamBlock,
    pub depth: usize,
    pub update_weight: bool,
    pub update_bias: bool,
}

impl LayerParameters {
    /// Layer with `out_dim x in_dim` weights and a 1 x `out_dim` bias, both
    /// trainable.
    pub fn new(out_dim: usize, in_dim: usize, depth: usize) -> Self {
        Self {
            weight: ParamBlock::new(out_dim, in_dim),
            bias: ParamBlock::new(1, out_dim),
            depth,
            update_weight: true,
            update_bias: true,
        }
    }

    /// Freeze or unfreeze the whole layer.
    pub fn set_trainable(&mut self, trainable: bool) {
        self.update_weight = trainable;
        self.update_bias = trainable;
    }
}
