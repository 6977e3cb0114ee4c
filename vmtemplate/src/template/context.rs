//! Shared run context for the template steps.

use crate::artifact::{Artifact, VmLocator};
use crate::pipeline::StepState;
use crate::vsphere::{DatacenterRef, FolderRef, VmRef, VsphereClient};
use std::sync::Arc;
use uuid::Uuid;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// Typed per-invocation state.
///
/// Created fresh for each invocation and passed by `&mut` from step to step.
/// Fields are only ever filled in, never cleared, while the run is going.
pub struct TemplateContext {
    pub invocation_id: Uuid,
    pub client: Arc<dyn VsphereClient>,
    /// The artifact being finalized; marked as a template on success.
    pub artifact: Artifact,
    pub locator: VmLocator,
    /// VM handle returned by the settle wait; replaced after conversion.
    pub vm: VmRef,
    /// Set by ChooseDatacenter.
    pub datacenter: Option<DatacenterRef>,
    /// Set by CreateFolder, only when a folder is configured.
    pub folder: Option<FolderRef>,
    /// Folders CreateFolder had to create (they are not rolled back).
    pub created_folders: Vec<FolderRef>,
    /// Name of the snapshot taken by CreateSnapshot.
    pub snapshot: Option<String>,
    pub error: Option<VmTemplateError>,
}

impl TemplateContext {
    pub fn new(
        invocation_id: Uuid,
        client: Arc<dyn VsphereClient>,
        artifact: Artifact,
        locator: VmLocator,
        vm: VmRef,
    ) -> Self {
        Self {
            invocation_id,
            client,
            artifact,
            locator,
            vm,
            datacenter: None,
            folder: None,
            created_folders: Vec::new(),
            snapshot: None,
            error: None,
        }
    }

    pub fn require_datacenter(&self) -> VmTemplateResult<&DatacenterRef> {
        self.datacenter
            .as_ref()
            .ok_or_else(|| VmTemplateError::Internal("choose_datacenter step must run first".into()))
    }
}

impl StepState for TemplateContext {
    fn error(&self) -> Option<&VmTemplateError> {
        self.error.as_ref()
    }

    fn record_error(&mut self, error: VmTemplateError) {
        // first error wins
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}
