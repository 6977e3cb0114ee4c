//! Compatibility gate for incoming artifacts.

use super::{
    ARTIFACT_CONF_FORMAT, ARTIFACT_CONF_KEEP_REGISTERED, ARTIFACT_CONF_SKIP_EXPORT, Artifact,
};
use std::collections::HashMap;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// Family of producers whose artifacts this stage understands.
///
/// The family decides how the artifact id maps onto a VM location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerKind {
    /// VMware builders running against a remote ESXi host. The artifact id is the VM name.
    Vmware,
    /// The vSphere builder. The artifact id is `<datacenter>::<folder>::<vm name>`.
    Vsphere,
    /// Artifacts re-labelled by the artifice post-processor. The id is the VM name.
    Artifice,
}

/// Allow-list of producer identities.
///
/// Seeded with the built-in producers; callers may register more without
/// touching this crate.
#[derive(Debug, Clone)]
pub struct ProducerRegistry {
    producers: HashMap<String, ProducerKind>,
}

impl ProducerRegistry {
    /// Registry with no producers at all.
    pub fn empty() -> Self {
        Self {
            producers: HashMap::new(),
        }
    }

    /// Registry seeded with the producers known to emit remote VMs.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register("packer.post-processor.vsphere", ProducerKind::Vmware)
            .register("mitchellh.vmware-esx", ProducerKind::Vmware)
            .register("jetbrains.vsphere", ProducerKind::Vsphere)
            .register("packer.post-processor.artifice", ProducerKind::Artifice);
        registry
    }

    pub fn register(&mut self, producer_id: impl Into<String>, kind: ProducerKind) -> &mut Self {
        self.producers.insert(producer_id.into(), kind);
        self
    }

    pub fn kind_of(&self, producer_id: &str) -> Option<ProducerKind> {
        self.producers.get(producer_id).copied()
    }
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Rejects artifacts this stage cannot finalize.
///
/// Validation is pure and must run before any connection is opened.
#[derive(Debug, Clone, Default)]
pub struct ArtifactGate {
    registry: ProducerRegistry,
}

impl ArtifactGate {
    pub fn new(registry: ProducerRegistry) -> Self {
        Self { registry }
    }

    /// Check the producer identity and the export flags.
    ///
    /// Returns the producer family on success.
    pub fn validate(&self, artifact: &Artifact) -> VmTemplateResult<ProducerKind> {
        let kind = self
            .registry
            .kind_of(artifact.producer_id())
            .ok_or_else(|| VmTemplateError::UnsupportedArtifact(artifact.producer_id().into()))?;

        let format = artifact.state(ARTIFACT_CONF_FORMAT);
        let keep_registered = artifact.state(ARTIFACT_CONF_KEEP_REGISTERED);
        let skip_export = artifact.state(ARTIFACT_CONF_SKIP_EXPORT);

        if !format.is_empty() && keep_registered != "true" && skip_export == "false" {
            return Err(VmTemplateError::ConflictingExportConfig);
        }

        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn esx_artifact() -> Artifact {
        Artifact::new("mitchellh.vmware-esx", "packer-vm")
    }

    #[test]
    fn test_builtin_producers_accepted() {
        let gate = ArtifactGate::default();
        for (id, kind) in [
            ("packer.post-processor.vsphere", ProducerKind::Vmware),
            ("mitchellh.vmware-esx", ProducerKind::Vmware),
            ("jetbrains.vsphere", ProducerKind::Vsphere),
            ("packer.post-processor.artifice", ProducerKind::Artifice),
        ] {
            let artifact = Artifact::new(id, "vm");
            assert_eq!(gate.validate(&artifact).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_producer_rejected() {
        let gate = ArtifactGate::default();
        for id in ["mitchellh.virtualbox", "", "jetbrains.vsphere "] {
            let artifact = Artifact::new(id, "vm");
            assert_eq!(
                gate.validate(&artifact).unwrap_err(),
                VmTemplateError::UnsupportedArtifact(id.to_string())
            );
        }
    }

    #[test]
    fn test_registered_producer_accepted() {
        let mut registry = ProducerRegistry::builtin();
        registry.register("acme.esx-builder", ProducerKind::Vmware);
        let gate = ArtifactGate::new(registry);

        let artifact = Artifact::new("acme.esx-builder", "vm");
        assert_eq!(gate.validate(&artifact).unwrap(), ProducerKind::Vmware);
    }

    #[test]
    fn test_empty_registry_rejects_builtin() {
        let gate = ArtifactGate::new(ProducerRegistry::empty());
        assert!(matches!(
            gate.validate(&esx_artifact()),
            Err(VmTemplateError::UnsupportedArtifact(_))
        ));
    }

    #[test]
    fn test_export_without_keep_registered_conflicts() {
        let gate = ArtifactGate::default();
        for keep in ["", "false", "yes"] {
            let artifact = esx_artifact()
                .with_state(ARTIFACT_CONF_FORMAT, "ovf")
                .with_state(ARTIFACT_CONF_KEEP_REGISTERED, keep)
                .with_state(ARTIFACT_CONF_SKIP_EXPORT, "false");
            assert_eq!(
                gate.validate(&artifact).unwrap_err(),
                VmTemplateError::ConflictingExportConfig
            );
        }
    }

    #[test]
    fn test_export_flags_that_do_not_conflict() {
        let gate = ArtifactGate::default();

        let keep = esx_artifact()
            .with_state(ARTIFACT_CONF_FORMAT, "ovf")
            .with_state(ARTIFACT_CONF_KEEP_REGISTERED, "true")
            .with_state(ARTIFACT_CONF_SKIP_EXPORT, "false");
        assert!(gate.validate(&keep).is_ok());

        let skipped = esx_artifact()
            .with_state(ARTIFACT_CONF_FORMAT, "ovf")
            .with_state(ARTIFACT_CONF_SKIP_EXPORT, "true");
        assert!(gate.validate(&skipped).is_ok());

        // skip_export absent is not "false"
        let unknown = esx_artifact().with_state(ARTIFACT_CONF_FORMAT, "ovf");
        assert!(gate.validate(&unknown).is_ok());

        let no_format = esx_artifact().with_state(ARTIFACT_CONF_SKIP_EXPORT, "false");
        assert!(gate.validate(&no_format).is_ok());
    }

    #[test]
    fn test_producer_checked_before_export_flags() {
        let gate = ArtifactGate::default();
        let artifact = Artifact::new("mitchellh.virtualbox", "vm")
            .with_state(ARTIFACT_CONF_FORMAT, "ovf")
            .with_state(ARTIFACT_CONF_SKIP_EXPORT, "false");
        assert!(matches!(
            gate.validate(&artifact),
            Err(VmTemplateError::UnsupportedArtifact(_))
        ));
    }
}
