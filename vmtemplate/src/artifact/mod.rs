//! Build artifacts handed over by the upstream pipeline stage.
//!
//! An artifact is opaque to this crate apart from three things:
//! - the identity of the producer that built it (checked by [`ArtifactGate`])
//! - its id, which names the VM on the remote endpoint (see [`VmLocator`])
//! - a string-keyed state lookup carrying the producer's export flags

mod gate;
mod locator;

pub use gate::{ArtifactGate, ProducerKind, ProducerRegistry};
pub use locator::{DISCOVERED_VM_FOLDER, VmLocator};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Export format chosen by the producer (empty when not exporting).
pub const ARTIFACT_CONF_FORMAT: &str = "artifact.conf.format";
/// Whether the producer keeps the VM registered after the build.
pub const ARTIFACT_CONF_KEEP_REGISTERED: &str = "artifact.conf.keep_registered";
/// Whether the producer skipped its own export step.
pub const ARTIFACT_CONF_SKIP_EXPORT: &str = "artifact.conf.skip_export";

/// Upstream build result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    producer_id: String,
    id: String,
    #[serde(default)]
    state: HashMap<String, String>,
    /// Set once the VM behind this artifact has been converted to a template.
    #[serde(default)]
    template: bool,
}

impl Artifact {
    pub fn new(producer_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            producer_id: producer_id.into(),
            id: id.into(),
            state: HashMap::new(),
            template: false,
        }
    }

    /// Attach a state entry (builder style).
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look up a state entry. Missing keys read as the empty string.
    pub fn state(&self, key: &str) -> &str {
        self.state.get(key).map(String::as_str).unwrap_or("")
    }

    /// True once the VM has been converted; the artifact is no longer runnable.
    pub fn is_template(&self) -> bool {
        self.template
    }

    pub(crate) fn mark_as_template(&mut self) {
        self.template = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_reads_empty() {
        let artifact = Artifact::new("mitchellh.vmware-esx", "packer-vm");
        assert_eq!(artifact.state(ARTIFACT_CONF_FORMAT), "");
    }

    #[test]
    fn test_with_state() {
        let artifact = Artifact::new("mitchellh.vmware-esx", "packer-vm")
            .with_state(ARTIFACT_CONF_FORMAT, "ova")
            .with_state(ARTIFACT_CONF_KEEP_REGISTERED, "true");
        assert_eq!(artifact.state(ARTIFACT_CONF_FORMAT), "ova");
        assert_eq!(artifact.state(ARTIFACT_CONF_KEEP_REGISTERED), "true");
        assert!(!artifact.is_template());
    }

    #[test]
    fn test_mark_as_template() {
        let mut artifact = Artifact::new("jetbrains.vsphere", "dc::folder::vm");
        artifact.mark_as_template();
        assert!(artifact.is_template());
    }
}
