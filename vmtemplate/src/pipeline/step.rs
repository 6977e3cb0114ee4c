//! Generic step trait for ordered execution.

use async_trait::async_trait;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// What the runner should do after a step returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    Halt,
}

/// Trait for steps that can be executed by a [`StepRunner`](super::StepRunner).
///
/// Steps receive the run context by mutable reference and may leave state in
/// it for their successors.
#[async_trait]
pub trait PipelineStep<Ctx: Send>: Send + Sync {
    async fn run(&self, ctx: &mut Ctx) -> VmTemplateResult<StepAction>;

    /// Called in reverse order for every step that ran, whatever the outcome.
    async fn cleanup(&self, _ctx: &mut Ctx) {}

    /// Get human-readable step name for logging.
    fn name(&self) -> &str;
}

pub type BoxedStep<Ctx> = Box<dyn PipelineStep<Ctx>>;

/// Terminal error slot of a run context.
///
/// Once an error is recorded no further step may run.
pub trait StepState {
    fn error(&self) -> Option<&VmTemplateError>;

    fn record_error(&mut self, error: VmTemplateError);
}
