//! Per-run trainer context.
//!
//! All state that was historically process-global lives here and is threaded
//! explicitly through the components that need it: the update counter
//! advanced by the gradient update engine, the shared scratch tensor sized
//! to the largest batch seen, and the training tracer.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::tensor::Tensor;

/// The lifecycle steps of a training run that can be timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceStep {
    /// Forward pass through the network
    Forward,
    /// Backward pass (gradient computation)
    Backward,
    /// Criterion accumulation (reductions over outputs)
    Criterion,
    /// Parameter update step
    Update,
    /// Host/device data transfer
    Transfer,
    /// Checkpoint save or reload
    Checkpoint,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single timing measurement.
#[derive(Debug, Clone)]
pub struct TraceMeasurement {
    pub step: TraceStep,
    pub duration: Duration,
}

/// Collector of timing measurements for one training run.
///
/// Disabled by default; when disabled, `start`/`end` are no-ops so the hot
/// loop pays nothing for the instrumentation.
#[derive(Debug, Default)]
pub struct Tracer {
    measurements: Vec<TraceMeasurement>,
    active_spans: HashMap<TraceStep, Instant>,
    enabled: bool,
}

impl Tracer {
    /// Create a disabled tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable tracing.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable tracing.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Check if tracing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start a timing span.
    pub fn start(&mut self, step: TraceStep) {
        if !self.enabled {
            return;
        }
        self.active_spans.insert(step, Instant::now());
    }

    /// End a timing span and record the measurement.
    pub fn end(&mut self, step: TraceStep) {
        if !self.enabled {
            return;
        }
        if let Some(start) = self.active_spans.remove(&step) {
            self.measurements.push(TraceMeasurement { step, duration: start.elapsed() });
        }
    }

    /// Clear all measurements.
    pub fn clear(&mut self) {
        self.measurements.clear();
        self.active_spans.clear();
    }

    /// Recorded measurements.
    pub fn measurements(&self) -> &[TraceMeasurement] {
        &self.measurements
    }

    /// Render per-step totals, sorted by accumulated duration.
    pub fn report(&self) -> String {
        if self.measurements.is_empty() {
            return "no trace measurements recorded".to_string();
        }

        let mut totals: HashMap<TraceStep, Duration> = HashMap::new();
        let mut counts: HashMap<TraceStep, usize> = HashMap::new();
        let mut total_time = Duration::ZERO;
        for m in &self.measurements {
            *totals.entry(m.step).or_default() += m.duration;
            *counts.entry(m.step).or_default() += 1;
            total_time += m.duration;
        }

        let mut output = format!("trace: total measured time {total_time:.2?}\n");
        let mut sorted_steps: Vec<_> = totals.keys().copied().collect();
        sorted_steps.sort_by(|a, b| totals[b].cmp(&totals[a]));
        for step in sorted_steps {
            let duration = totals[&step];
            let pct = if total_time.as_nanos() > 0 {
                duration.as_secs_f64() / total_time.as_secs_f64() * 100.0
            } else {
                0.0
            };
            output.push_str(&format!(
                "  {:<10} | {:<6} | {:<12.2?} | {:>6.2}%\n",
                step.to_string(),
                counts[&step],
                duration,
                pct
            ));
        }
        output
    }
}

/// Mutable per-run state shared by the training loop, update engine and
/// checkpoint manager.
#[derive(Debug, Default)]
pub struct TrainerContext {
    /// Number of parameter updates applied since the run (or snapshot) began.
    ///
    /// Advanced only by the update engine; reset only by a checkpoint reload.
    pub update_count: u64,

    /// Shared scratch tensor, grown to the largest batch seen.
    pub scratch: Tensor,

    /// Timing collector for this run.
    pub tracer: Tracer,
}

impl TrainerContext {
    /// Create a fresh context with an empty scratch tensor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the scratch tensor resized to `rows x cols`.
    ///
    /// Contents are unspecified; callers overwrite before reading.
    pub fn scratch(&mut self, rows: usize, cols: usize) -> &mut Tensor {
        self.scratch.resize(rows, cols);
        &mut self.scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_step_display() {
        assert_eq!(TraceStep::Forward.to_string(), "Forward");
        assert_eq!(TraceStep::Update.to_string(), "Update");
        assert_eq!(TraceStep::Checkpoint.to_string(), "Checkpoint");
    }

    #[test]
    fn test_tracer_disabled_records_nothing() {
        let mut tracer = Tracer::new();
        tracer.start(TraceStep::Forward);
        tracer.end(TraceStep::Forward);
        assert!(tracer.measurements().is_empty());
    }

    #[test]
    fn test_tracer_enabled_records_span() {
        let mut tracer = Tracer::new();
        tracer.enable();
        tracer.start(TraceStep::Backward);
        tracer.end(TraceStep::Backward);
        assert_eq!(tracer.measurements().len(), 1);
        assert_eq!(tracer.measurements()[0].step, TraceStep::Backward);
    }

    #[test]
    fn test_tracer_report_empty() {
        let tracer = Tracer::new();
        assert!(tracer.report().contains("no trace measurements"));
    }

    #[test]
    fn test_tracer_report_contains_step() {
        let mut tracer = Tracer::new();
        tracer.enable();
        tracer.start(TraceStep::Update);
        tracer.end(TraceStep::Update);
        let report = tracer.report();
        assert!(report.contains("Update"));
    }

    #[test]
    fn test_tracer_clear() {
        let mut tracer = Tracer::new();
        tracer.enable();
        tracer.start(TraceStep::Forward);
        tracer.end(TraceStep::Forward);
        tracer.clear();
        assert!(tracer.measurements().is_empty());
    }

    #[test]
    fn test_context_scratch_grows_and_keeps_capacity() {
        let mut ctx = TrainerContext::new();
        ctx.scratch(4, 16);
        assert_eq!(ctx.scratch.capacity(), 64);
        ctx.scratch(2, 16);
        // Smaller batch reuses the existing allocation.
        assert_eq!(ctx.scratch.capacity(), 64);
        assert_eq!(ctx.scratch.len(), 32);
    }

    #[test]
    fn test_context_update_count_starts_at_zero() {
        let ctx = TrainerContext::new();
        assert_eq!(ctx.update_count, 0);
    }
}
