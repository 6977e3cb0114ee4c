//! Ordered step runner.
//!
//! Runs a fixed list of steps against one mutable context, stopping at the
//! first failure and unwinding cleanup hooks afterwards.

use super::metrics::{RunMetrics, StepMetrics};
use super::step::{BoxedStep, StepAction, StepState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use vmtemplate_shared::errors::VmTemplateError;

pub struct ExecutionPlan<Ctx: Send> {
    steps: Vec<BoxedStep<Ctx>>,
}

impl<Ctx: Send> ExecutionPlan<Ctx> {
    pub fn new(steps: Vec<BoxedStep<Ctx>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn steps(self) -> Vec<BoxedStep<Ctx>> {
        self.steps
    }
}

/// Hook consulted before each step, e.g. to wait for a keypress in debug mode.
#[async_trait]
pub trait PauseHook: Send + Sync {
    async fn before_step(&self, index: usize, name: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step returned `Continue`.
    Completed,
    /// Execution stopped at `step`, which failed or halted.
    Halted { step: String },
    /// Cancellation was observed before `step` started.
    Cancelled { step: String },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub metrics: RunMetrics,
    pub started_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Sequential executor.
///
/// Steps depend on state left by their predecessors, so there is no parallel
/// mode and the order is the plan order.
pub struct StepRunner<Ctx: Send> {
    steps: Vec<BoxedStep<Ctx>>,
    cancel: CancellationToken,
    pause: Option<Arc<dyn PauseHook>>,
}

impl<Ctx: StepState + Send> StepRunner<Ctx> {
    pub fn from_plan(plan: ExecutionPlan<Ctx>) -> Self {
        Self {
            steps: plan.steps(),
            cancel: CancellationToken::new(),
            pause: None,
        }
    }

    /// Check `token` between steps. A step already running is not interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_pause(mut self, hook: Arc<dyn PauseHook>) -> Self {
        self.pause = Some(hook);
        self
    }

    /// Run all steps against `ctx`.
    ///
    /// The first error (or an explicit halt, or cancellation) is recorded in
    /// `ctx` and stops the run. Cleanup then runs for every step that
    /// executed, last first.
    pub async fn run(&self, ctx: &mut Ctx) -> RunReport {
        let started_at = Utc::now();
        let total_start = Instant::now();
        let mut step_metrics = Vec::new();
        let mut executed = 0usize;
        let mut outcome = RunOutcome::Completed;

        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name();

            if ctx.error().is_some() {
                tracing::debug!(step = name, "Error already recorded, not starting step");
                outcome = RunOutcome::Halted {
                    step: name.to_string(),
                };
                break;
            }

            if let Some(pause) = &self.pause {
                pause.before_step(index, name).await;
            }

            if self.cancel.is_cancelled() {
                tracing::info!(step = name, "Cancelled before step");
                ctx.record_error(VmTemplateError::Cancelled);
                outcome = RunOutcome::Cancelled {
                    step: name.to_string(),
                };
                break;
            }

            tracing::debug!(step = name, index, "Running step");
            let step_start = Instant::now();
            let result = step.run(ctx).await;
            executed += 1;

            let action = result.as_ref().ok().copied();
            step_metrics.push(StepMetrics {
                index,
                name: name.to_string(),
                duration_ms: step_start.elapsed().as_millis(),
                action,
            });

            match result {
                Ok(StepAction::Continue) => {}
                Ok(StepAction::Halt) => {
                    tracing::warn!(step = name, "Step halted the run");
                    if ctx.error().is_none() {
                        ctx.record_error(VmTemplateError::Halted(name.to_string()));
                    }
                    outcome = RunOutcome::Halted {
                        step: name.to_string(),
                    };
                    break;
                }
                Err(e) => {
                    tracing::debug!(step = name, error = %e, "Step returned an error");
                    ctx.record_error(e);
                    outcome = RunOutcome::Halted {
                        step: name.to_string(),
                    };
                    break;
                }
            }
        }

        for step in self.steps[..executed].iter().rev() {
            tracing::trace!(step = step.name(), "Running cleanup");
            step.cleanup(ctx).await;
        }

        RunReport {
            outcome,
            metrics: RunMetrics {
                total_duration_ms: total_start.elapsed().as_millis(),
                steps: step_metrics,
            },
            started_at,
        }
    }
}
