//! Error types for the training core.
//!
//! Conditions a caller can act on surface as `Result` (file IO, schedule
//! parsing, checkpoint chain misuse) or as soft sentinels (`Option` from the
//! LU routines). Malformed-numerics conditions such as a dimension mismatch
//! with validation enabled, a non-positive-definite matrix on the Cholesky
//! path, or SVD failing to converge are fatal and panic, since they reflect
//! a broken model rather than a transient fault.

use thiserror::Error;

/// Errors produced by the training core
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure while reading or writing schedule/checkpoint state
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization or deserialization failed
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A schedule-state file line did not match the expected tag or value
    #[error("schedule file line {line}: {message}")]
    ScheduleFormat { line: usize, message: String },

    /// The schedule-state file names a scheduler kind this core does not support
    #[error("unknown scheduler kind: {0}")]
    UnknownScheduler(String),

    /// Invalid component configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A rollback was requested that would leave the checkpoint chain empty
    #[error("checkpoint chain would become empty; the initial model must remain at the head")]
    EmptyCheckpointChain,
}

/// Result type for fallible operations in the training core
pub type Result<T> = std::result::Result<T, Error>;
