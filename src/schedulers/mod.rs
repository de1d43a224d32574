//! Concurrent superstep execution and version-gated scheduling.
//!
//! A [`Scheduler`] drives one superstep at a time: it decides which nodes in
//! the current frontier actually need to run (version-gating, mirroring the
//! barrier's own "only bump on change" discipline), runs them concurrently up
//! to a configured limit, and reports back an ordered [`StepRunResult`] for
//! the barrier to merge.

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerError, SchedulerState, StepRunResult};
