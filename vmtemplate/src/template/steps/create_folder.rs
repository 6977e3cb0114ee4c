//! Step: Create folder - make sure the target folder path exists.
//!
//! Walks up from the full path until an existing folder is found, then
//! creates the missing segments top-down. Running it again is a no-op.

use super::{log_step_error, remote_detail, step_start};
use crate::pipeline::{PipelineStep, StepAction};
use crate::template::TemplateContext;
use crate::vsphere::{DatacenterRef, FolderRef, VsphereClient};
use async_trait::async_trait;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

pub struct CreateFolderStep {
    /// Path below the datacenter's VM root, e.g. `templates/linux`.
    pub folder: Option<String>,
}

/// Output from folder creation.
struct FolderOutput {
    folder: FolderRef,
    created: Vec<FolderRef>,
}

#[async_trait]
impl PipelineStep<TemplateContext> for CreateFolderStep {
    async fn run(&self, ctx: &mut TemplateContext) -> VmTemplateResult<StepAction> {
        let step_name = self.name();
        step_start(ctx, step_name);

        let datacenter = ctx.require_datacenter()?.clone();

        let Some(folder) = self.folder.as_deref() else {
            tracing::debug!("No folder configured, keeping current placement");
            return Ok(StepAction::Continue);
        };

        let output = ensure_folder(ctx.client.as_ref(), &datacenter, folder)
            .await
            .inspect_err(|e| log_step_error(ctx, step_name, e))?;

        if !output.created.is_empty() {
            tracing::info!(
                folder = %output.folder.path,
                created = output.created.len(),
                "Created folder path"
            );
        }
        ctx.folder = Some(output.folder);
        ctx.created_folders.extend(output.created);

        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, ctx: &mut TemplateContext) {
        if ctx.error.is_some() && !ctx.created_folders.is_empty() {
            let paths: Vec<&str> = ctx.created_folders.iter().map(|f| f.path.as_str()).collect();
            tracing::warn!(folders = ?paths, "Run failed, created folders are left in place");
        }
    }

    fn name(&self) -> &str {
        "create_folder"
    }
}

async fn ensure_folder(
    client: &dyn VsphereClient,
    datacenter: &DatacenterRef,
    relative: &str,
) -> VmTemplateResult<FolderOutput> {
    let root = datacenter.vm_folder_path();
    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(bad) = segments.iter().find(|s| **s == "." || **s == "..") {
        return Err(VmTemplateError::FolderCreation(format!(
            "invalid segment '{}' in folder path '{}'",
            bad, relative
        )));
    }

    let path_of = |depth: usize| {
        let mut path = root.clone();
        for segment in &segments[..depth] {
            path.push('/');
            path.push_str(segment);
        }
        path
    };

    // Deepest folder that already exists.
    let mut depth = segments.len();
    let mut current = loop {
        let path = path_of(depth);
        let found = client
            .find_folder(&path)
            .await
            .map_err(|e| VmTemplateError::FolderCreation(remote_detail(e)))?;
        if let Some(folder) = found {
            break folder;
        }
        if depth == 0 {
            return Err(VmTemplateError::FolderCreation(format!(
                "couldn't find VM folder root {}",
                root
            )));
        }
        depth -= 1;
    };

    let mut created = Vec::new();
    for segment in &segments[depth..] {
        current = client
            .create_folder(&current, segment)
            .await
            .map_err(|e| VmTemplateError::FolderCreation(remote_detail(e)))?;
        tracing::debug!(folder = %current.path, "Created folder");
        created.push(current.clone());
    }

    Ok(FolderOutput {
        folder: current,
        created,
    })
}
