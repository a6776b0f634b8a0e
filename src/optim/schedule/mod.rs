//! Learning rate schedulers.
//!
//! Four policies drive the rate across a run:
//! - `AdaGrad` - per-parameter rates from the squared-gradient sum
//! - `Exponential` - sample-indexed exponential decay
//! - `List` - one pre-declared rate per epoch
//! - `NewBob` - criterion-driven halving with rollback on regression
//!
//! One [`Schedule`] value holds the active policy plus the fields every
//! policy shares. It is created at training start (fresh or loaded from a
//! persisted state file), asked for a rate once per update and for a
//! decision once per epoch, and never replaced mid-run. The rate is always
//! kept non-negative; the update engine applies the sign at subtraction.

mod adagrad;
mod exponential;
mod list;
mod newbob;
mod persist;

pub use adagrad::{refresh_adaptive_rates, AdaGrad};
pub use exponential::Exponential;
pub use list::RateList;
pub use newbob::{NewBob, NewBobCriterion, NewBobStatus};

use crate::error::Result;

/// Fields shared by every schedule kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleCommon {
    /// Current learning rate, non-negative.
    pub rate: f32,
    /// Training stops once the rate falls below this floor.
    pub floor_rate: f32,
    /// Run at least this many epochs before any stop condition other than
    /// the hard maximum applies.
    pub min_epoch: usize,
    /// Hard upper bound on epochs.
    pub max_epoch: usize,
    /// Offset added to the in-run epoch index when reporting/persisting,
    /// so resumed runs keep a global epoch numbering.
    pub epoch_offset: usize,
    /// Divide the per-update rate by the number of samples in the update.
    pub normalize: bool,
}

impl Default for ScheduleCommon {
    fn default() -> Self {
        Self {
            rate: 0.0,
            floor_rate: 0.0,
            min_epoch: 0,
            max_epoch: usize::MAX,
            epoch_offset: 0,
            normalize: false,
        }
    }
}

/// The active policy of a [`Schedule`].
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    AdaGrad(AdaGrad),
    Exponential(Exponential),
    List(RateList),
    NewBob(NewBob),
}

impl Policy {
    /// Persistence tag for the kind line.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Policy::AdaGrad(_) => "ADAGRAD",
            Policy::Exponential(_) => "EXPONENTIAL",
            Policy::List(_) => "LIST",
            Policy::NewBob(_) => "NEWBOB",
        }
    }
}

/// Rate handed to the update engine for one update step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateRate {
    /// Scale every gradient by this scalar.
    Scalar(f32),
    /// Per-parameter rates: refresh each block's `adaptive_rate` from its
    /// squared-gradient sum with [`refresh_adaptive_rates`], then call the
    /// engine with no scalar rate.
    PerParameter { eta: f32, k: f32 },
}

/// What the schedule decided at an epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochDecision {
    /// Discard the regressed epoch and reload the last accepted checkpoint.
    pub rollback: bool,
    /// Run another epoch.
    pub continue_training: bool,
}

/// A learning rate schedule: shared fields plus the active policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub common: ScheduleCommon,
    pub policy: Policy,
}

impl Schedule {
    /// AdaGrad schedule with base rate `eta` and smoothing floor `k`.
    ///
    /// # Panics
    /// Panics if `k < 1`; the smoothing floor keeps the per-parameter
    /// denominator away from zero before any gradient accumulates.
    pub fn adagrad(eta: f32, k: f32) -> Self {
        assert!(k >= 1.0, "adagrad smoothing floor must be >= 1, got {k}");
        Self {
            common: ScheduleCommon { rate: eta, ..Default::default() },
            policy: Policy::AdaGrad(AdaGrad { k }),
        }
    }

    /// Exponential decay `rate = init_rate * base^(-samples/gamma)`.
    pub fn exponential(init_rate: f32, base: f32, gamma: f32) -> Self {
        Self {
            common: ScheduleCommon { rate: init_rate, ..Default::default() },
            policy: Policy::Exponential(Exponential {
                base_rate: init_rate,
                base,
                gamma,
                samples: 0,
            }),
        }
    }

    /// One fixed rate per epoch; training ends when the list is exhausted.
    ///
    /// # Panics
    /// Panics on an empty list.
    pub fn rate_list(rates: Vec<f32>) -> Self {
        assert!(!rates.is_empty(), "rate list must not be empty");
        let first = rates[0];
        Self {
            common: ScheduleCommon { rate: first, ..Default::default() },
            policy: Policy::List(RateList { rates }),
        }
    }

    /// NewBob halving schedule judged by `criterion`.
    pub fn newbob(init_rate: f32, criterion: NewBobCriterion, ramp_start: f32, stop_diff: f32) -> Self {
        Self {
            common: ScheduleCommon { rate: init_rate, ..Default::default() },
            policy: Policy::NewBob(NewBob {
                criterion,
                status: NewBobStatus::Initial,
                ramp_start,
                stop_diff,
                last_criterion: None,
            }),
        }
    }

    /// Set the minimum and maximum epoch bounds.
    pub fn with_epoch_bounds(mut self, min_epoch: usize, max_epoch: usize) -> Self {
        self.common.min_epoch = min_epoch;
        self.common.max_epoch = max_epoch;
        self
    }

    /// Set the floor rate below which training stops.
    pub fn with_floor_rate(mut self, floor: f32) -> Self {
        self.common.floor_rate = floor;
        self
    }

    /// Set the epoch offset of a resumed run.
    pub fn with_epoch_offset(mut self, offset: usize) -> Self {
        self.common.epoch_offset = offset;
        self
    }

    /// Divide the per-update rate by the number of samples in the update.
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.common.normalize = normalize;
        self
    }

    /// Current learning rate.
    pub fn current_rate(&self) -> f32 {
        self.common.rate
    }

    /// Global index of in-run epoch `epoch` for reporting and persistence.
    pub fn global_epoch(&self, epoch: usize) -> usize {
        self.common.epoch_offset + epoch
    }

    /// Fix the rate for in-run epoch `epoch` (zero-based) before it starts.
    ///
    /// Epoch-indexed policies count in global epochs, so a resumed run
    /// continues where the saved one left off rather than replaying from
    /// the first entry.
    pub fn begin_epoch(&mut self, epoch: usize) {
        let global = self.global_epoch(epoch);
        if let Policy::List(list) = &self.policy {
            self.common.rate = list.rate_for_epoch(global);
        }
    }

    /// Rate for one update step covering `samples_in_update` samples.
    ///
    /// Advances the Exponential policy's sample index.
    pub fn rate_for_update(&mut self, samples_in_update: usize) -> UpdateRate {
        if let Policy::Exponential(exp) = &mut self.policy {
            exp.samples += samples_in_update as u64;
            self.common.rate = exp.rate_now();
        }
        let rate = if self.common.normalize && samples_in_update > 0 {
            self.common.rate / samples_in_update as f32
        } else {
            self.common.rate
        };
        match &self.policy {
            Policy::AdaGrad(ada) => UpdateRate::PerParameter { eta: rate, k: ada.k },
            _ => UpdateRate::Scalar(rate),
        }
    }

    /// Decide at the end of in-run epoch `epoch` (zero-based) whether to
    /// roll back and whether to continue.
    ///
    /// `criterion` is the epoch's quality score, higher is better. Stop
    /// conditions other than the hard epoch maximum are suppressed until
    /// `min_epoch` epochs have run. Epoch counts are global: the offset of
    /// a resumed run counts toward the bounds and list exhaustion, so a
    /// loaded schedule makes the same decisions the uninterrupted run
    /// would have made.
    pub fn end_epoch(&mut self, epoch: usize, criterion: f32) -> EpochDecision {
        let epochs_done = self.global_epoch(epoch) + 1;
        let mut rollback = false;
        let mut policy_stop = false;

        match &mut self.policy {
            Policy::AdaGrad(_) | Policy::Exponential(_) => {}
            Policy::List(list) => {
                policy_stop = epochs_done >= list.rates.len();
            }
            Policy::NewBob(nb) => {
                let outcome =
                    nb.end_epoch(&mut self.common.rate, criterion, epochs_done, self.common.min_epoch);
                rollback = outcome.rollback;
                policy_stop = outcome.stop;
            }
        }

        let mut stop = epochs_done >= self.common.max_epoch;
        if epochs_done >= self.common.min_epoch {
            stop = stop || policy_stop || self.common.rate < self.common.floor_rate;
        }
        EpochDecision { rollback, continue_training: !stop }
    }

    /// Write the schedule state to `path` in the tagged text format.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        persist::save(self, path)
    }

    /// Load a schedule state previously written by [`Schedule::save`].
    pub fn load(path: &std::path::Path) -> Result<Self> {
        persist::load(path)
    }
}
