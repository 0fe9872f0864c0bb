//! Periodic worker loops and the adaptive cadence that drives them.

pub mod cadence;
pub mod error;
pub mod indicator;
pub mod interval;
pub mod worker;

pub use cadence::{CadenceBand, CadenceController, CadenceTable};
pub use error::{CadenceError, LifecycleError};
pub use indicator::{IndicatorCache, IndicatorReading, IndicatorSample, IndicatorSettings, ReadingOrigin};
pub use interval::{AdaptiveCadence, CadenceDecision, IntervalSource};
pub use worker::{RetryPolicy, TickOutcome, WorkUnit, WorkerLoop, WorkerReport, WorkerState};
