//! Shared primitives for the vmtemplate workspace.
//!
//! Holds the error taxonomy and small value types that both the engine and
//! its collaborators (remote clients, test doubles) need to agree on.

pub mod errors;
pub mod trilean;

pub use errors::{VmTemplateError, VmTemplateResult};
pub use trilean::Trilean;
