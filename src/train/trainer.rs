//! The training loop.
//!
//! Drives epochs until the schedule's termination predicate says stop. Each
//! epoch pulls chunks from the data cache, runs forward/criteria/backward,
//! and applies parameter updates at the end of each accumulation window. At
//! the epoch boundary the criteria are reported, the epoch's snapshot is
//! appended to the checkpoint chain, the schedule judges the epoch (possibly
//! popping the snapshot again and rolling back), and the schedule state is
//! persisted.

use crate::backend::MathBackend;
use crate::checkpoint::CheckpointManager;
use crate::context::{TraceStep, TrainerContext};
use crate::error::Result;
use crate::optim::schedule::{refresh_adaptive_rates, Schedule, UpdateRate};
use crate::optim::update::UpdateEngine;
use crate::train::config::{TrainOptions, UpdateMode};
use crate::train::criteria::{CriteriaAccumulator, EpochReport};
use crate::train::network::{CriterionSource, DataCache, Network};

/// Orchestrator owning the schedule, engine, checkpoint chain and criteria.
pub struct TrainingLoop {
    options: TrainOptions,
    schedule: Schedule,
    engine: UpdateEngine,
    checkpoints: CheckpointManager,
    criteria: CriteriaAccumulator,
}

impl TrainingLoop {
    /// Build a loop; creates the checkpoint directory.
    pub fn new(options: TrainOptions, schedule: Schedule, engine: UpdateEngine) -> Result<Self> {
        options.validate()?;
        let checkpoints = CheckpointManager::new(&options.checkpoint_dir)?;
        Ok(Self { options, schedule, engine, checkpoints, criteria: CriteriaAccumulator::new() })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run epochs until the schedule stops, returning one report per epoch.
    pub fn run(
        &mut self,
        net: &mut dyn Network,
        cache: &mut dyn DataCache,
        objective: &dyn CriterionSource,
        backend: &dyn MathBackend,
        ctx: &mut TrainerContext,
    ) -> Result<Vec<EpochReport>> {
        // Head of the chain: the initial model, so even a first-epoch
        // regression has a rollback target.
        self.checkpoints.append(
            net.layers(),
            f32::NEG_INFINITY,
            self.schedule.global_epoch(0),
            ctx,
        )?;

        let mut reports = Vec::new();
        let mut epoch = 0usize;
        loop {
            self.schedule.begin_epoch(epoch);
            self.criteria.reset();
            cache.reset();
            self.run_epoch(net, cache, objective, backend, ctx)?;

            let report = self
                .criteria
                .report(self.schedule.global_epoch(epoch), self.schedule.current_rate());
            if self.options.report {
                println!("{report}");
            }
            let criterion = self.epoch_criterion(&report);

            // Append first, judge second: a regressed epoch's snapshot is
            // popped again before the rollback reload.
            ctx.tracer.start(TraceStep::Checkpoint);
            self.checkpoints.append(
                net.layers(),
                criterion,
                self.schedule.global_epoch(epoch + 1),
                ctx,
            )?;
            ctx.tracer.end(TraceStep::Checkpoint);

            let decision = self.schedule.end_epoch(epoch, criterion);
            if decision.rollback {
                ctx.tracer.start(TraceStep::Checkpoint);
                self.checkpoints.pop_last()?;
                self.checkpoints.reload_last(net.layers_mut(), ctx)?;
                ctx.tracer.end(TraceStep::Checkpoint);
            }
            // Persist with the offset advanced past this epoch, so a run
            // resumed from the file continues the global numbering.
            let mut persisted = self.schedule.clone();
            persisted.common.epoch_offset = self.schedule.global_epoch(epoch + 1);
            persisted.save(&self.options.schedule_path)?;

            reports.push(report);
            if !decision.continue_training {
                break;
            }
            epoch += 1;
        }
        Ok(reports)
    }

    /// The scalar the schedule judges an epoch by.
    fn epoch_criterion(&self, report: &EpochReport) -> f32 {
        use crate::optim::schedule::{NewBobCriterion, Policy};
        match &self.schedule.policy {
            Policy::NewBob(nb) => match nb.criterion {
                NewBobCriterion::Acc | NewBobCriterion::MapAcc => report.accuracy as f32,
                NewBobCriterion::LlhVal | NewBobCriterion::MapLlhVal => {
                    report.log_likelihood as f32
                }
            },
            _ => report.accuracy as f32,
        }
    }

    fn run_epoch(
        &mut self,
        net: &mut dyn Network,
        cache: &mut dyn DataCache,
        objective: &dyn CriterionSource,
        backend: &dyn MathBackend,
        ctx: &mut TrainerContext,
    ) -> Result<()> {
        let nominal_update_samples = self.options.batch_size * self.options.updates_every;
        let mut samples_in_window = 0usize;
        let mut chunks_in_window = 0usize;
        let mut utterances_in_window = 0usize;
        let mut first_update_done = false;

        loop {
            let info = cache.fill_next();
            if info.frames > 0 {
                // The first chunk of a window overwrites the gradients; the
                // rest accumulate into them.
                let accumulate = samples_in_window > 0;

                ctx.tracer.start(TraceStep::Forward);
                let err = {
                    let outputs = net.forward(cache.batch(), backend);
                    ctx.tracer.end(TraceStep::Forward);
                    ctx.tracer.start(TraceStep::Criterion);
                    let losses = objective.sample_losses(outputs, cache.targets(), backend);
                    self.criteria.add_chunk(outputs, cache.targets(), &losses, backend);
                    ctx.tracer.end(TraceStep::Criterion);
                    objective.error_signal(outputs, cache.targets(), backend)
                };
                ctx.tracer.start(TraceStep::Backward);
                net.backward(&err, accumulate, backend);
                ctx.tracer.end(TraceStep::Backward);

                samples_in_window += info.frames;
                chunks_in_window += 1;
                if info.end_of_utterance {
                    self.criteria.note_utterance();
                    utterances_in_window += 1;
                }
            }

            let window_full = match self.options.mode {
                UpdateMode::Batch => {
                    // The warm-up window stretches only the very first update.
                    let threshold = if first_update_done {
                        self.options.updates_every
                    } else {
                        self.options.updates_every + self.options.warmup_batches
                    };
                    chunks_in_window >= threshold
                }
                UpdateMode::Utterance => utterances_in_window >= self.options.updates_every,
            };
            if window_full && samples_in_window > 0 {
                self.apply_update(net, samples_in_window, backend, ctx);
                samples_in_window = 0;
                chunks_in_window = 0;
                utterances_in_window = 0;
                first_update_done = true;
            }

            if info.exhausted {
                if samples_in_window > 0 {
                    if self.options.mode == UpdateMode::Batch {
                        // Trailing partial window: bring the step size in
                        // line with a full window's.
                        let factor = samples_in_window as f32 / nominal_update_samples as f32;
                        if factor != 1.0 {
                            self.engine.scale_gradients(net.layers_mut(), factor, backend);
                        }
                    }
                    self.apply_update(net, samples_in_window, backend, ctx);
                }
                break;
            }
        }
        Ok(())
    }

    fn apply_update(
        &mut self,
        net: &mut dyn Network,
        samples: usize,
        backend: &dyn MathBackend,
        ctx: &mut TrainerContext,
    ) {
        ctx.tracer.start(TraceStep::Update);
        match self.schedule.rate_for_update(samples) {
            UpdateRate::PerParameter { eta, k } => {
                refresh_adaptive_rates(net.layers_mut(), eta, k, backend);
                self.engine.apply(net.layers_mut(), None, backend, ctx);
            }
            UpdateRate::Scalar(rate) => {
                self.engine.apply(net.layers_mut(), Some(rate), backend, ctx);
            }
        }
        ctx.tracer.end(TraceStep::Update);
    }
}
