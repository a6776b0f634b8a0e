//! External collaborator seams: the network, the data cache, and the
//! criterion source.
//!
//! The training loop is architecture-agnostic. It drives an opaque
//! [`Network`] through forward and backward passes, pulls chunks from a
//! [`DataCache`], and turns outputs into losses and an error signal through
//! a [`CriterionSource`]. Feature extraction, label parsing and lattice
//! scoring all live behind these traits.

use crate::backend::MathBackend;
use crate::optim::params::LayerParameters;
use crate::tensor::Tensor;

/// Shape of one chunk pulled from the data cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInfo {
    /// Frames (samples) in the chunk; zero when nothing was left.
    pub frames: usize,
    /// The chunk ends an utterance.
    pub end_of_utterance: bool,
    /// The stream has no further chunks this epoch.
    pub exhausted: bool,
}

/// The opaque layered network.
///
/// `forward` returns the output activations for the chunk; `backward`
/// consumes an error signal of the same shape and either overwrites or
/// accumulates into the per-layer gradients, which is what makes gradient
/// accumulation windows work.
pub trait Network {
    fn forward(&mut self, batch: &Tensor, backend: &dyn MathBackend) -> &Tensor;

    fn backward(&mut self, error_signal: &Tensor, accumulate: bool, backend: &dyn MathBackend);

    /// Trainable parameters, addressable by the update engine.
    fn layers(&self) -> &[LayerParameters];

    fn layers_mut(&mut self) -> &mut [LayerParameters];
}

/// Source of training chunks.
pub trait DataCache {
    /// Advance to the next chunk and describe it. The chunk's features and
    /// targets are then available from `batch`/`targets` until the next call.
    fn fill_next(&mut self) -> BatchInfo;

    /// Rewind to the start of the stream for the next epoch.
    fn reset(&mut self);

    /// Feature matrix of the current chunk, one frame per row.
    fn batch(&self) -> &Tensor;

    /// Target matrix of the current chunk, same row count as `batch`.
    fn targets(&self) -> &Tensor;
}

/// Per-chunk loss sums computed from network outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleLosses {
    pub cross_entropy: f64,
    pub squared_error: f64,
    pub log_likelihood: f64,
}

/// Turns outputs and targets into losses and the backward error signal.
pub trait CriterionSource {
    fn sample_losses(
        &self,
        outputs: &Tensor,
        targets: &Tensor,
        backend: &dyn MathBackend,
    ) -> SampleLosses;

    /// Error signal fed to [`Network::backward`], same shape as `outputs`.
    fn error_signal(
        &self,
        outputs: &Tensor,
        targets: &Tensor,
        backend: &dyn MathBackend,
    ) -> Tensor;
}

/// Frame-level objective over softmax (cross-entropy) or linear
/// (squared-error) outputs. For both, the output-layer error signal is
/// `outputs - targets`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameObjective;

impl CriterionSource for FrameObjective {
    fn sample_losses(
        &self,
        outputs: &Tensor,
        targets: &Tensor,
        backend: &dyn MathBackend,
    ) -> SampleLosses {
        let mut logs = Tensor::new(outputs.rows(), outputs.cols());
        backend.log_floor(outputs, &mut logs);

        let mut cross_entropy = 0.0f64;
        let mut squared_error = 0.0f64;
        for ((&y, &t), &log_y) in
            outputs.host().iter().zip(targets.host()).zip(logs.host())
        {
            cross_entropy -= f64::from(t) * f64::from(log_y);
            let d = f64::from(y - t);
            squared_error += d * d;
        }
        SampleLosses { cross_entropy, squared_error, log_likelihood: -cross_entropy }
    }

    fn error_signal(
        &self,
        outputs: &Tensor,
        targets: &Tensor,
        backend: &dyn MathBackend,
    ) -> Tensor {
        let mut err = Tensor::new(outputs.rows(), outputs.cols());
        backend.copy(outputs, &mut err);
        backend.sub(targets, &mut err);
        err
    }
}
