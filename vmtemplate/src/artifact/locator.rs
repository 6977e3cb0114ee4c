//! Mapping from an artifact id to the VM's location in the inventory.

use super::{Artifact, ProducerKind};
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// Folder ESXi places VMs in when they were registered outside of vCenter.
pub const DISCOVERED_VM_FOLDER: &str = "Discovered virtual machine";

/// Where to find the built VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmLocator {
    /// Datacenter name, when the producer recorded one.
    pub datacenter: Option<String>,
    /// Folder relative to the datacenter's VM root.
    pub folder: String,
    pub name: String,
}

impl VmLocator {
    pub fn from_artifact(artifact: &Artifact, kind: ProducerKind) -> VmTemplateResult<Self> {
        match kind {
            ProducerKind::Vsphere => {
                let parts: Vec<&str> = artifact.id().split("::").collect();
                match parts.as_slice() {
                    [datacenter, folder, name] if !name.is_empty() => Ok(Self {
                        datacenter: (!datacenter.is_empty()).then(|| datacenter.to_string()),
                        folder: folder.trim_matches('/').to_string(),
                        name: name.to_string(),
                    }),
                    _ => Err(VmTemplateError::UnsupportedArtifact(format!(
                        "{} (malformed artifact id '{}', expected <datacenter>::<folder>::<vm>)",
                        artifact.producer_id(),
                        artifact.id()
                    ))),
                }
            }
            ProducerKind::Vmware | ProducerKind::Artifice => {
                if artifact.id().is_empty() {
                    return Err(VmTemplateError::UnsupportedArtifact(format!(
                        "{} (artifact has no VM name)",
                        artifact.producer_id()
                    )));
                }
                Ok(Self {
                    datacenter: None,
                    folder: DISCOVERED_VM_FOLDER.to_string(),
                    name: artifact.id().to_string(),
                })
            }
        }
    }
}

impl std::fmt::Display for VmLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.datacenter {
            Some(dc) => write!(f, "/{}/vm/{}/{}", dc, self.folder, self.name),
            None => write!(f, "{}/{}", self.folder, self.name),
        }
    }
}
