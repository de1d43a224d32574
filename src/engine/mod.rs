//! The graph execution engine: condition evaluation, executor dispatch, the
//! cooperative step driver, and the interrupt/resume protocol.
//!
//! Sits above `domain::graph_def` (the data shape) and below `store`
//! (persistence); it computes "what happens next" and leaves writing it down
//! to the repository layer, the same separation `schedulers::Scheduler`
//! keeps from `app::App::apply_barrier`.

pub mod condition;
pub mod executor;
pub mod interrupt;
pub mod step;

pub use condition::{Condition, ConditionError};
pub use executor::{ExecutorOutcome, ExecutorRegistry, InterruptRequest, NodeExecutor};
pub use interrupt::{resume_with_tool_outputs, ResumeOutcome};
pub use step::{step, StepOutcome};
