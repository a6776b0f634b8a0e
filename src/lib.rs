//! escuchar: SGD training core for neural-network acoustic models
//!
//! The crate provides the backend-agnostic machinery that sits between a
//! layered network and its training data:
//! - `tensor` / `backend` - dense numeric kernels with interchangeable CPU,
//!   vendor-math and CUDA implementations behind one trait
//! - `linalg` - host-resident f64 Cholesky, LU and SVD routines
//! - `optim` - parameter state, the fixed-order gradient update engine, and
//!   the learning rate schedulers (AdaGrad, exponential, list, NewBob) with
//!   persisted state
//! - `checkpoint` - the accepted-snapshot chain with rollback
//! - `train` - the epoch/update orchestration over opaque network, data
//!   cache and criterion collaborators
//!
//! # Example
//!
//! ```no_run
//! use escuchar::backend::{create, BackendKind, BackendOptions};
//! use escuchar::optim::{Schedule, NewBobCriterion, UpdateConfig, UpdateEngine};
//! use escuchar::train::TrainOptions;
//! use escuchar::TrainingLoop;
//!
//! let backend = create(&BackendOptions::new(BackendKind::Cpu));
//! let schedule = Schedule::newbob(0.5, NewBobCriterion::Acc, 0.004, 0.002)
//!     .with_epoch_bounds(2, 20);
//! let engine = UpdateEngine::new(UpdateConfig::new().with_momentum(0.9));
//! let options = TrainOptions::new(256, "checkpoints");
//! let mut training = TrainingLoop::new(options, schedule, engine).unwrap();
//! let _ = backend;
//! let _ = training;
//! ```

pub mod backend;
pub mod checkpoint;
pub mod context;
pub mod error;
pub mod linalg;
pub mod optim;
pub mod tensor;
pub mod train;

pub use backend::{BackendKind, BackendOptions, MathBackend};
pub use checkpoint::{CheckpointManager, CheckpointRecord};
pub use context::{TraceStep, Tracer, TrainerContext};
pub use error::{Error, Result};
pub use optim::{LayerParameters, ParamBlock, Schedule, UpdateConfig, UpdateEngine};
pub use tensor::Tensor;
pub use train::{EpochReport, TrainOptions, TrainingLoop};
