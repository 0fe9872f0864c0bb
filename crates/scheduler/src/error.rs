use thiserror::Error;

use crate::worker::WorkerState;

/// A lifecycle call that the worker's current state does not allow.
///
/// These indicate a defect in the caller, not an environmental condition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("worker {worker}: cannot {operation} while {state}")]
    InvalidTransition {
        worker: String,
        operation: &'static str,
        state: WorkerState,
    },

    #[error("worker {worker}: start() called outside a Tokio runtime")]
    NoRuntime { worker: String },
}

/// A regime band table that does not cover the indicator line exactly once.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CadenceError {
    #[error("cadence table has no bands")]
    Empty,

    #[error("the last cadence band must be a catch-all (no upper bound)")]
    MissingCatchAll,

    #[error("band {label} has no upper bound but is not last")]
    CatchAllNotLast { label: String },

    #[error("band {label} upper bound {upper} does not exceed previous bound {previous}")]
    NotIncreasing {
        label: String,
        previous: f64,
        upper: f64,
    },

    #[error("band {label} upper bound must be finite")]
    NonFiniteBound { label: String },

    #[error("band {label} has a zero interval")]
    ZeroInterval { label: String },
}
