//! Optimization: parameter state, the gradient update engine, and the
//! learning rate schedulers.

pub mod params;
pub mod schedule;
pub mod update;

pub use params::{LayerParameters, ParamBlock};
pub use schedule::{
    refresh_adaptive_rates, EpochDecision, NewBobCriterion, NewBobStatus, Policy, Schedule,
    ScheduleCommon, UpdateRate,
};
pub use update::{UpdateConfig, UpdateEngine};
