//! Training loop and its collaborator seams
//!
//! This module provides the epoch/update orchestration:
//! - External collaborator traits (`Network`, `DataCache`, `CriterionSource`)
//! - Per-epoch criterion accumulation and reporting
//! - Training configuration (`TrainOptions`)
//! - The `TrainingLoop` driver with gradient accumulation, warm-up and
//!   trailing-batch rescaling

mod config;
mod criteria;
mod network;
mod trainer;

pub use config::{TrainOptions, UpdateMode};
pub use criteria::{CriteriaAccumulator, EpochReport};
pub use network::{BatchInfo, CriterionSource, DataCache, FrameObjective, Network, SampleLosses};
pub use trainer::TrainingLoop;
