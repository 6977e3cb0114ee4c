//! Template finalization steps.

mod choose_datacenter;
mod create_folder;
mod create_snapshot;
mod mark_as_template;

pub use choose_datacenter::ChooseDatacenterStep;
pub use create_folder::CreateFolderStep;
pub use create_snapshot::CreateSnapshotStep;
pub use mark_as_template::MarkAsTemplateStep;

use super::TemplateContext;
use vmtemplate_shared::errors::VmTemplateError;

fn step_start(ctx: &TemplateContext, step_name: &str) {
    tracing::debug!(
        invocation_id = %ctx.invocation_id,
        vm = %ctx.locator,
        step = step_name,
        "Step started"
    );
}

fn log_step_error(ctx: &TemplateContext, step_name: &str, error: &VmTemplateError) {
    tracing::error!(
        invocation_id = %ctx.invocation_id,
        vm = %ctx.locator,
        step = step_name,
        "Step failed: {}",
        error
    );
}

/// Message of a client failure without the generic `Remote` prefix.
fn remote_detail(error: VmTemplateError) -> String {
    match error {
        VmTemplateError::Remote(message) => message,
        other => other.to_string(),
    }
}
