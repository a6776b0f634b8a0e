//! Per-epoch criterion accumulation.

use std::fmt;

use crate::backend::MathBackend;
use crate::tensor::Tensor;
use crate::train::network::SampleLosses;

/// Running per-epoch sums, reset at every epoch start.
#[derive(Debug, Default)]
pub struct CriteriaAccumulator {
    frames: u64,
    utterances: u64,
    correct: u64,
    cross_entropy: f64,
    squared_error: f64,
    log_likelihood: f64,
    // argmax scratch, reused across chunks
    out_idx: Tensor,
    tgt_idx: Tensor,
}

impl CriteriaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all sums for a new epoch.
    pub fn reset(&mut self) {
        self.frames = 0;
        self.utterances = 0;
        self.correct = 0;
        self.cross_entropy = 0.0;
        self.squared_error = 0.0;
        self.log_likelihood = 0.0;
    }

    /// Fold one chunk into the sums. Correct-prediction counting compares
    /// the per-row argmax of outputs and targets.
    pub fn add_chunk(
        &mut self,
        outputs: &Tensor,
        targets: &Tensor,
        losses: &SampleLosses,
        backend: &dyn MathBackend,
    ) {
        let rows = outputs.rows();
        self.out_idx.resize(1, rows);
        self.tgt_idx.resize(1, rows);
        backend.row_argmax(outputs, &mut self.out_idx);
        backend.row_argmax(targets, &mut self.tgt_idx);
        self.correct += self
            .out_idx
            .host()
            .iter()
            .zip(self.tgt_idx.host())
            .filter(|(a, b)| a == b)
            .count() as u64;

        self.frames += rows as u64;
        self.cross_entropy += losses.cross_entropy;
        self.squared_error += losses.squared_error;
        self.log_likelihood += losses.log_likelihood;
    }

    /// Record a finished utterance.
    pub fn note_utterance(&mut self) {
        self.utterances += 1;
    }

    /// Frames folded in so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Fraction of frames whose output argmax matched the target argmax.
    pub fn accuracy(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.correct as f64 / self.frames as f64
        }
    }

    /// Summarize the epoch for reporting and scheduler decisions.
    pub fn report(&self, epoch: usize, rate: f32) -> EpochReport {
        let frames = self.frames.max(1) as f64;
        EpochReport {
            epoch,
            rate,
            frames: self.frames,
            utterances: self.utterances,
            accuracy: self.accuracy(),
            mean_cross_entropy: self.cross_entropy / frames,
            mean_squared_error: self.squared_error / frames,
            log_likelihood: self.log_likelihood,
        }
    }
}

/// The numbers printed at every epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub rate: f32,
    pub frames: u64,
    pub utterances: u64,
    pub accuracy: f64,
    pub mean_cross_entropy: f64,
    pub mean_squared_error: f64,
    pub log_likelihood: f64,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch {:>3} | rate {:<12} | frames {:>9} | utts {:>6} | acc {:>7.4} | xent {:>10.6} | mse {:>10.6} | llh {:>12.4}",
            self.epoch,
            self.rate,
            self.frames,
            self.utterances,
            self.accuracy,
            self.mean_cross_entropy,
            self.mean_squared_error,
            self.log_likelihood,
        )
    }
}
