//! Error taxonomy for the template finalization stage.

use thiserror::Error;

pub type VmTemplateResult<T> = Result<T, VmTemplateError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VmTemplateError {
    /// One or more configuration problems, reported together.
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    #[error(
        "unsupported artifact: producer '{0}' is not a registered VMware/vSphere producer"
    )]
    UnsupportedArtifact(String),

    #[error("exporting requires the VM to stay registered: set keep_registered to true")]
    ConflictingExportConfig,

    #[error("failed to connect to vSphere: {0}")]
    Connection(String),

    /// Auto-discovery found more than one datacenter.
    #[error("datacenter is ambiguous, choose one of: {}", .0.join(", "))]
    AmbiguousDatacenter(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to create folder: {0}")]
    FolderCreation(String),

    #[error("failed to create snapshot: {0}")]
    Snapshot(String),

    #[error("failed to convert VM to template: {0}")]
    TemplateConversion(String),

    #[error("virtual machine '{vm}' did not settle within {waited_ms}ms")]
    SettleTimeout { vm: String, waited_ms: u128 },

    /// Raw failure reported by the remote client, before a step classifies it.
    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("step '{0}' halted the run")]
    Halted(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}
