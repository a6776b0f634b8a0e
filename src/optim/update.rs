//! Gradient update engine.
//!
//! Applies one SGD step to every trainable block in the fixed order
//! decay, rate scaling, clipping, momentum blend, subtraction. The order is
//! part of the contract: reordering any two steps changes the numbers.

use crate::backend::MathBackend;
use crate::context::TrainerContext;
use crate::optim::params::{LayerParameters, ParamBlock};

/// Hyper-parameters of one update step.
#[derive(Debug, Clone, Copy)]
pub struct UpdateConfig {
    /// Momentum factor blended into the update buffer.
    pub momentum: f32,
    /// L2 weight-decay factor added into the gradient.
    pub weight_decay: f32,
    /// Symmetric clip bound for weight gradients, before depth shrink.
    pub clip_weight_bound: Option<f32>,
    /// Symmetric clip bound for bias gradients, before depth shrink.
    pub clip_bias_bound: Option<f32>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self { momentum: 0.0, weight_decay: 0.0, clip_weight_bound: None, clip_bias_bound: None }
    }
}

impl UpdateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_weight_decay(mut self, decay: f32) -> Self {
        self.weight_decay = decay;
        self
    }

    /// Clip weight gradients to `±bound / 2^depth`.
    pub fn with_weight_clip(mut self, bound: f32) -> Self {
        self.clip_weight_bound = Some(bound);
        self
    }

    /// Clip bias gradients to `±bound / 2^depth`.
    pub fn with_bias_clip(mut self, bound: f32) -> Self {
        self.clip_bias_bound = Some(bound);
        self
    }
}

/// Applies parameter updates through a [`MathBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateEngine {
    config: UpdateConfig,
}

impl UpdateEngine {
    pub fn new(config: UpdateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Apply one update step to every trainable block.
    ///
    /// `rate` is the scalar learning rate, kept non-negative; the sign is
    /// applied only at the final subtraction. `None` signals that each
    /// block's `adaptive_rate` tensor was already filled by an adaptive
    /// scheduler and the gradient is scaled elementwise instead.
    ///
    /// Advances the context's update counter by one.
    pub fn apply(
        &self,
        layers: &mut [LayerParameters],
        rate: Option<f32>,
        backend: &dyn MathBackend,
        ctx: &mut TrainerContext,
    ) {
        for layer in layers.iter_mut() {
            let depth = layer.depth;
            if layer.update_weight {
                self.apply_block(&mut layer.weight, rate, self.config.clip_weight_bound, depth, backend);
            }
            if layer.update_bias {
                self.apply_block(&mut layer.bias, rate, self.config.clip_bias_bound, depth, backend);
            }
        }
        ctx.update_count += 1;
    }

    fn apply_block(
        &self,
        block: &mut ParamBlock,
        rate: Option<f32>,
        clip_bound: Option<f32>,
        depth: usize,
        backend: &dyn MathBackend,
    ) {
        // 1. decay into the gradient
        if self.config.weight_decay != 0.0 {
            backend.axpy(self.config.weight_decay, &block.value, &mut block.grad);
        }
        // 2. scalar rate, or precomputed per-parameter rates
        match rate {
            Some(r) => backend.scale(r, &mut block.grad),
            None => backend.mul(&block.adaptive_rate, &mut block.grad),
        }
        // 3. clip, bound shrinking geometrically with depth
        if let Some(bound) = clip_bound {
            let b = bound / (1u32 << depth.min(31)) as f32;
            backend.clip(-b, b, &mut block.grad);
        }
        // 4. update = momentum * update + grad
        backend.scaled_add(self.config.momentum, &block.grad, &mut block.update);
        // 5. value -= update
        backend.sub(&block.update, &mut block.value);
    }

    /// Rescale every trainable block's accumulated gradient, used to
    /// compensate a trailing partial batch (actual / nominal samples).
    pub fn scale_gradients(
        &self,
        layers: &mut [LayerParameters],
        factor: f32,
        backend: &dyn MathBackend,
    ) {
        for layer in layers.iter_mut() {
            if layer.update_weight {
                backend.scale(factor, &mut layer.weight.grad);
            }
            if layer.update_bias {
                backend.scale(factor, &mut layer.bias.grad);
            }
        }
    }
}
