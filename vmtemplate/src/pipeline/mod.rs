//! Generic ordered step execution framework.
//!
//! This module provides the step runner used by the template stage:
//! - Steps execute strictly in plan order, one at a time
//! - The first failure (or explicit halt) stops the run
//! - Cleanup hooks of every step that ran are unwound in reverse order
//! - Cancellation and an optional pause hook are consulted between steps
//!
//! ## Architecture
//!
//! ```text
//! ExecutionPlan → StepRunner → RunReport
//!
//! - ExecutionPlan: Fixed ordered list of steps
//! - StepRunner:    Runs the plan against a mutable context
//! - RunReport:     Outcome plus per-step timing
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pipeline::{ExecutionPlan, StepRunner};
//!
//! let plan = ExecutionPlan::new(vec![Box::new(StepA), Box::new(StepB)]);
//! let report = StepRunner::from_plan(plan)
//!     .with_cancellation(token)
//!     .run(&mut ctx)
//!     .await;
//! println!("run took {}ms", report.metrics.total_duration_ms);
//! ```

mod metrics;
mod runner;
mod step;

pub use metrics::{RunMetrics, StepMetrics};
pub use runner::{ExecutionPlan, PauseHook, RunOutcome, RunReport, StepRunner};
pub use step::{BoxedStep, PipelineStep, StepAction, StepState};
