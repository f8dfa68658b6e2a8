//! Error types.
//!
//! Per-type resolution gaps are not errors at all: the front end reports them
//! as `None` and the classifier skips the type. Everything here is either a
//! module-level failure (recovered by the coordinator) or fatal to the run.

use thiserror::Error;

/// Failures reported by a front-end session for a whole module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrontEndError {
    /// The unit set for the module could not be provided.
    #[error("Failed to open unit set for {module}: {reason}")]
    Open { module: String, reason: String },

    /// Parsing or analysis broke down internally.
    #[error("Front-end analysis failed: {0}")]
    Internal(String),

    /// The scan was stopped before it finished.
    #[error("Analysis cancelled")]
    Cancelled,
}

/// A module coordinate that is not `group:artifact:version`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid module coordinate '{0}', expected group:artifact:version")]
pub struct CoordinateError(pub String);

/// Consistency violations detected while merging classification records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// Two types both claim to be the definition of the same extension point.
    #[error("Extension point {family} defined twice: {existing} and {incoming}")]
    DuplicateDefinition {
        family: String,
        existing: String,
        incoming: String,
    },
}

/// Failures of the coordinator itself. These terminate the run.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Coordinator has already been started")]
    AlreadyStarted,

    #[error("Worker pool closed before all modules were dispatched")]
    PoolClosed,

    #[error("Worker task for {module} was lost: {reason}")]
    WorkerLost { module: String, reason: String },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}
