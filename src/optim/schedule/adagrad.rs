//! AdaGrad per-parameter rates.

use crate::backend::MathBackend;
use crate::optim::params::LayerParameters;

/// AdaGrad policy state. The per-parameter rate is
/// `eta / sqrt(k + grad_sq_sum)`; the squared-gradient sum lives in each
/// parameter block and is never reset, so the effective rate only ever
/// decreases. Epoch bounds are the only termination condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaGrad {
    /// Smoothing floor, at least 1.
    pub k: f32,
}

/// Fold each trainable block's current gradient into its squared-gradient
/// sum and recompute its `adaptive_rate` tensor.
///
/// Call once per update step, before handing the engine a `None` rate.
pub fn refresh_adaptive_rates(
    layers: &mut [LayerParameters],
    eta: f32,
    k: f32,
    backend: &dyn MathBackend,
) {
    for layer in layers.iter_mut() {
        if layer.update_weight {
            let w = &mut layer.weight;
            backend.accumulate_square(&w.grad, &mut w.grad_sq_sum);
            backend.adagrad_rate(eta, k, &w.grad_sq_sum, &mut w.adaptive_rate);
        }
        if layer.update_bias {
            let b = &mut layer.bias;
            backend.accumulate_square(&b.grad, &mut b.grad_sq_sum);
            backend.adagrad_rate(eta, k, &b.grad_sq_sum, &mut b.adaptive_rate);
        }
    }
}
