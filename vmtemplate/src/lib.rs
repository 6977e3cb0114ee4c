//! vSphere template finalization.
//!
//! Post-build stage that turns the virtual machine produced by an earlier
//! builder into a reusable vSphere template: it picks the datacenter, makes
//! sure the target folder exists, optionally snapshots the VM and finally
//! converts it. Remote access goes through the [`vsphere::VsphereClient`]
//! trait; [`vsphere::fake`] provides an in-memory endpoint for tests.

pub mod artifact;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod template;
pub mod vsphere;

pub use artifact::{Artifact, ArtifactGate, ProducerKind, ProducerRegistry};
pub use config::TemplateConfig;
pub use logging::{LogConfig, init_logging};
pub use template::{PostProcessOutput, PostProcessor};
pub use vmtemplate_shared::{Trilean, VmTemplateError, VmTemplateResult};
