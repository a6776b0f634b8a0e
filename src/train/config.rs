//! Training loop configuration.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Minibatch boundary policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Fixed-size minibatches, irrespective of utterance boundaries.
    Batch,
    /// Update windows aligned to whole utterances.
    Utterance,
}

/// Options for one training run.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub mode: UpdateMode,
    /// Nominal samples per batch, used to rescale the trailing partial batch.
    pub batch_size: usize,
    /// Batches (or utterances) accumulated into one update.
    pub updates_every: usize,
    /// Extra leading batches force-accumulated before the very first update.
    /// Batch mode only.
    pub warmup_batches: usize,
    /// Where checkpoint snapshots are written.
    pub checkpoint_dir: PathBuf,
    /// Where the schedule state is persisted at each epoch boundary.
    pub schedule_path: PathBuf,
    /// Print the epoch report.
    pub report: bool,
}

impl TrainOptions {
    /// Batch-mode options with single-batch updates and no warm-up.
    pub fn new(batch_size: usize, checkpoint_dir: impl Into<PathBuf>) -> Self {
        let checkpoint_dir = checkpoint_dir.into();
        let schedule_path = checkpoint_dir.join("schedule.txt");
        Self {
            mode: UpdateMode::Batch,
            batch_size,
            updates_every: 1,
            warmup_batches: 0,
            checkpoint_dir,
            schedule_path,
            report: true,
        }
    }

    pub fn with_mode(mut self, mode: UpdateMode) -> Self {
        self.mode = mode;
        self
    }

    /// Accumulate gradients over `n` batches/utterances per update.
    pub fn with_updates_every(mut self, n: usize) -> Self {
        self.updates_every = n;
        self
    }

    pub fn with_warmup(mut self, batches: usize) -> Self {
        self.warmup_batches = batches;
        self
    }

    pub fn with_schedule_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schedule_path = path.into();
        self
    }

    pub fn with_report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }

    /// Reject configurations the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.updates_every == 0 {
            return Err(Error::Config("updates_every must be at least 1".to_string()));
        }
        Ok(())
    }
}
