//! Step: Mark as template - convert the VM into a template.
//!
//! Two strategies:
//! - In place (default): place the VM in the target folder if one was
//!   configured, then flag it as a template.
//! - Re-register: unregister the VM and register its `.vmx` again as a
//!   template in the target folder. The target is the configured folder or
//!   the VM's current one. A different object with the same name already in
//!   the target folder fails the step before anything is unregistered.

use super::{log_step_error, remote_detail, step_start};
use crate::pipeline::{PipelineStep, StepAction};
use crate::template::TemplateContext;
use crate::vsphere::{FolderRef, RegisterSpec, VmRef, VsphereClient};
use async_trait::async_trait;
use vmtemplate_shared::Trilean;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

pub struct MarkAsTemplateStep {
    pub reregister: Trilean,
}

#[async_trait]
impl PipelineStep<TemplateContext> for MarkAsTemplateStep {
    async fn run(&self, ctx: &mut TemplateContext) -> VmTemplateResult<StepAction> {
        let step_name = self.name();
        step_start(ctx, step_name);

        let vm = ctx.vm.clone();

        let converted = if self.reregister.is_true() {
            reregister_as_template(ctx.client.as_ref(), &vm, ctx.folder.as_ref()).await
        } else {
            convert_in_place(ctx.client.as_ref(), &vm, ctx.folder.as_ref()).await
        }
        .inspect_err(|e| log_step_error(ctx, step_name, e))?;

        tracing::info!(template = %converted, "Marked VM as template");
        ctx.vm = converted;
        ctx.artifact.mark_as_template();

        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "mark_as_template"
    }
}

fn conversion_error(error: VmTemplateError) -> VmTemplateError {
    VmTemplateError::TemplateConversion(remote_detail(error))
}

async fn convert_in_place(
    client: &dyn VsphereClient,
    vm: &VmRef,
    folder: Option<&FolderRef>,
) -> VmTemplateResult<VmRef> {
    let mut vm = vm.clone();
    if let Some(folder) = folder
        && folder.path != vm.folder
    {
        vm = client
            .move_into_folder(folder, &vm)
            .await
            .map_err(conversion_error)?;
        tracing::debug!(vm = %vm, "Moved VM into target folder");
    }

    client.mark_as_template(&vm).await.map_err(conversion_error)?;
    Ok(vm)
}

async fn reregister_as_template(
    client: &dyn VsphereClient,
    vm: &VmRef,
    folder: Option<&FolderRef>,
) -> VmTemplateResult<VmRef> {
    let placement = client.placement(vm).await.map_err(conversion_error)?;
    let target = folder
        .cloned()
        .unwrap_or_else(|| FolderRef::new(placement.folder.clone()));

    let existing = client
        .find_vm_in_folder(&target, &vm.name)
        .await
        .map_err(conversion_error)?;
    if let Some(existing) = existing
        && existing.id != vm.id
    {
        return Err(VmTemplateError::TemplateConversion(format!(
            "an object named '{}' already exists in {}",
            vm.name, target.path
        )));
    }

    client.unregister_vm(vm).await.map_err(conversion_error)?;

    let spec = RegisterSpec {
        vmx_path: placement.vmx_path,
        name: vm.name.clone(),
        host: placement.host,
        as_template: true,
    };
    client
        .register_vm(&target, &spec)
        .await
        .map_err(conversion_error)
        .inspect_err(|_| {
            tracing::error!(
                vmx = %spec.vmx_path,
                host = %spec.host,
                "VM was unregistered but could not be registered again"
            )
        })
}
