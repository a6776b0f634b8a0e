//! NewBob: criterion-driven halving with rollback on regression.

/// Which held-out criterion judges an epoch. Higher is always better; the
/// log-likelihood variants are expected already negated accordingly by the
/// criterion source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewBobCriterion {
    /// Frame accuracy.
    Acc,
    /// Maximum-a-posteriori frame accuracy.
    MapAcc,
    /// Log-likelihood value.
    LlhVal,
    /// Maximum-a-posteriori log-likelihood value.
    MapLlhVal,
}

impl NewBobCriterion {
    pub fn tag(&self) -> &'static str {
        match self {
            NewBobCriterion::Acc => "ACC",
            NewBobCriterion::MapAcc => "MAPACC",
            NewBobCriterion::LlhVal => "LLHVAL",
            NewBobCriterion::MapLlhVal => "MAPLLHVAL",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ACC" => Some(NewBobCriterion::Acc),
            "MAPACC" => Some(NewBobCriterion::MapAcc),
            "LLHVAL" => Some(NewBobCriterion::LlhVal),
            "MAPLLHVAL" => Some(NewBobCriterion::MapLlhVal),
            _ => None,
        }
    }
}

/// The two phases of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewBobStatus {
    /// Rate held until improvement tails off.
    Initial,
    /// Rate halves every epoch.
    Ramping,
}

impl NewBobStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            NewBobStatus::Initial => "INITIAL",
            NewBobStatus::Ramping => "RAMPING",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "INITIAL" => Some(NewBobStatus::Initial),
            "RAMPING" => Some(NewBobStatus::Ramping),
            _ => None,
        }
    }
}

/// Outcome of one NewBob epoch decision.
pub(crate) struct NewBobOutcome {
    pub rollback: bool,
    pub stop: bool,
}

/// NewBob policy state.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBob {
    pub criterion: NewBobCriterion,
    pub status: NewBobStatus,
    /// Improvement threshold below which ramping begins.
    pub ramp_start: f32,
    /// Improvement threshold below which a ramping run stops.
    pub stop_diff: f32,
    /// Criterion of the last accepted epoch; `None` before the first one.
    pub last_criterion: Option<f32>,
}

impl NewBob {
    /// Judge one finished epoch.
    ///
    /// `delta` is the improvement over the last accepted epoch. A negative
    /// delta requests a rollback, and the regressed criterion is discarded:
    /// the comparison baseline stays at the accepted epoch's value. Halving
    /// decisions are made after the rollback request, on the same delta.
    pub(crate) fn end_epoch(
        &mut self,
        rate: &mut f32,
        criterion: f32,
        epochs_done: usize,
        min_epoch: usize,
    ) -> NewBobOutcome {
        let Some(previous) = self.last_criterion else {
            // First epoch of the run: nothing to compare against.
            self.last_criterion = Some(criterion);
            return NewBobOutcome { rollback: false, stop: false };
        };

        let delta = criterion - previous;
        let rollback = delta < 0.0;
        let mut stop = false;

        match self.status {
            NewBobStatus::Initial => {
                if delta < self.ramp_start {
                    *rate *= 0.5;
                    if epochs_done >= min_epoch {
                        self.status = NewBobStatus::Ramping;
                    }
                }
            }
            NewBobStatus::Ramping => {
                *rate *= 0.5;
                if delta < self.stop_diff {
                    stop = true;
                }
            }
        }

        if !rollback {
            self.last_criterion = Some(criterion);
        }
        NewBobOutcome { rollback, stop }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::schedule::Schedule;
    use approx::assert_abs_diff_eq;

    fn newbob_schedule() -> Schedule {
        Schedule::newbob(0.8, NewBobCriterion::Acc, 0.004, 0.002).with_epoch_bounds(0, 100)
    }

    #[test]
    fn test_first_epoch_only_records_baseline() {
        let mut s = newbob_schedule();
        let d = s.end_epoch(0, 0.50);
        assert!(!d.rollback);
        assert!(d.continue_training);
        assert_eq!(s.current_rate(), 0.8);
    }

    #[test]
    fn test_big_improvement_keeps_rate() {
        let mut s = newbob_schedule();
        s.end_epoch(0, 0.50);
        s.end_epoch(1, 0.60);
        assert_eq!(s.current_rate(), 0.8);
    }

    #[test]
    fn test_small_improvement_halves_and_ramps() {
        let mut s = newbob_schedule();
        s.end_epoch(0, 0.50);
        let d = s.end_epoch(1, 0.501);
        assert!(!d.rollback);
        assert_abs_diff_eq!(s.current_rate(), 0.4, epsilon = 1e-7);
        match &s.policy {
            crate::optim::schedule::Policy::NewBob(nb) => {
                assert_eq!(nb.status, NewBobStatus::Ramping);
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[test]
    fn test_ramping_halves_every_epoch() {
        let mut s = newbob_schedule();
        s.end_epoch(0, 0.50);
        s.end_epoch(1, 0.501); // enters ramping at rate 0.4
        let d = s.end_epoch(2, 0.52); // big improvement, still halves
        assert_abs_diff_eq!(s.current_rate(), 0.2, epsilon = 1e-7);
        assert!(d.continue_training);
    }

    #[test]
    fn test_regression_requests_rollback_and_keeps_baseline() {
        let mut s = newbob_schedule();
        s.end_epoch(0, 0.50);
        let d = s.end_epoch(1, 0.45);
        assert!(d.rollback);
        // Baseline stays at the accepted epoch; recovering past it counts
        // as improvement over 0.50, not 0.45.
        let d = s.end_epoch(2, 0.49);
        assert!(d.rollback, "0.49 still regresses against the accepted 0.50");
    }

    #[test]
    fn test_ramping_stops_below_stop_diff() {
        let mut s = newbob_schedule();
        s.end_epoch(0, 0.50);
        s.end_epoch(1, 0.501); // ramping
        let d = s.end_epoch(2, 0.5015); // delta 0.0005 < stop_diff 0.002
        assert!(!d.continue_training);
    }

    #[test]
    fn test_min_epoch_defers_ramping_transition() {
        let mut s = Schedule::newbob(0.8, NewBobCriterion::Acc, 0.004, 0.002)
            .with_epoch_bounds(5, 100);
        s.end_epoch(0, 0.50);
        s.end_epoch(1, 0.501);
        // Halved, but the minimum-epoch bound has not been reached yet.
        assert_abs_diff_eq!(s.current_rate(), 0.4, epsilon = 1e-7);
        match &s.policy {
            crate::optim::schedule::Policy::NewBob(nb) => {
                assert_eq!(nb.status, NewBobStatus::Initial);
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[test]
    fn test_criterion_tags_round_trip() {
        for c in [
            NewBobCriterion::Acc,
            NewBobCriterion::MapAcc,
            NewBobCriterion::LlhVal,
            NewBobCriterion::MapLlhVal,
        ] {
            assert_eq!(NewBobCriterion::from_tag(c.tag()), Some(c));
        }
        assert_eq!(NewBobCriterion::from_tag("BOGUS"), None);
    }
}
