//! Remote vSphere API seam.
//!
//! The wire protocol is owned by an external client library. This module only
//! fixes the operations the finalization steps need.
//!
//! ## Architecture
//!
//! - **VsphereConnector**: Session construction (creates a VsphereClient)
//! - **VsphereClient**: Inventory operations on an authenticated session
//!
//! The split mirrors connect vs. use: a connector can be shared between
//! invocations, while each client belongs to exactly one session.

pub mod fake;
mod types;

pub use types::{
    DatacenterRef, Endpoint, FolderRef, PowerState, RegisterSpec, SnapshotSpec, VmPlacement,
    VmRef,
};

use crate::artifact::VmLocator;
use std::sync::Arc;
use vmtemplate_shared::VmTemplateResult;

/// Trait for opening authenticated sessions.
#[async_trait::async_trait]
pub trait VsphereConnector: Send + Sync {
    /// Log in to the endpoint and return a client bound to the new session.
    ///
    /// Certificate verification must be skipped only when `endpoint.insecure` is set.
    async fn connect(&self, endpoint: &Endpoint) -> VmTemplateResult<Arc<dyn VsphereClient>>;
}

/// Trait for inventory operations on one session.
///
/// Calls map one-to-one onto remote requests; implementations must not retry.
#[async_trait::async_trait]
pub trait VsphereClient: Send + Sync {
    /// All datacenters visible to the session.
    async fn datacenters(&self) -> VmTemplateResult<Vec<DatacenterRef>>;

    async fn find_datacenter(&self, name: &str) -> VmTemplateResult<Option<DatacenterRef>>;

    /// Look up a folder by absolute inventory path (e.g. `/dc1/vm/templates`).
    async fn find_folder(&self, path: &str) -> VmTemplateResult<Option<FolderRef>>;

    /// Create `name` directly below `parent`.
    async fn create_folder(&self, parent: &FolderRef, name: &str) -> VmTemplateResult<FolderRef>;

    async fn find_vm(&self, locator: &VmLocator) -> VmTemplateResult<Option<VmRef>>;

    /// Look up a VM or template by name directly inside `folder`.
    async fn find_vm_in_folder(
        &self,
        folder: &FolderRef,
        name: &str,
    ) -> VmTemplateResult<Option<VmRef>>;

    async fn power_state(&self, vm: &VmRef) -> VmTemplateResult<PowerState>;

    /// Take a snapshot and wait for the task to finish.
    async fn create_snapshot(&self, vm: &VmRef, spec: &SnapshotSpec) -> VmTemplateResult<()>;

    /// Convert the VM in place.
    async fn mark_as_template(&self, vm: &VmRef) -> VmTemplateResult<()>;

    /// Move the VM into `folder`, returning the relocated handle.
    async fn move_into_folder(&self, folder: &FolderRef, vm: &VmRef) -> VmTemplateResult<VmRef>;

    /// Backing file and host of a registered VM.
    async fn placement(&self, vm: &VmRef) -> VmTemplateResult<VmPlacement>;

    /// Remove the VM from the inventory, keeping its files.
    async fn unregister_vm(&self, vm: &VmRef) -> VmTemplateResult<()>;

    /// Register a VM from its backing file and wait for the task to finish.
    async fn register_vm(&self, folder: &FolderRef, spec: &RegisterSpec)
    -> VmTemplateResult<VmRef>;

    async fn logout(&self) -> VmTemplateResult<()>;
}
