//! Capability handles and their registry.
//!
//! A capability is an external system (code host, search engine, file store, ...)
//! reachable through an MCP-style tool server launched as a child process. The
//! [`CapabilityHandle`] owns that connection and answers free-text tasks by
//! running a bounded specialist reasoning pass over the server's tools. The
//! [`CapabilityRegistry`] owns every handle and drives bulk lifecycle with
//! graceful degradation: a capability that cannot start is logged and skipped,
//! never fatal.

pub mod connection;
pub mod descriptor;
pub mod errors;
pub mod handle;
pub mod registry;
#[cfg(test)]
pub(crate) mod test_support;

pub use descriptor::CapabilityDescriptor;
pub use errors::{AggregateError, InvokeError, StartError, StopError};
pub use handle::{CapabilityHandle, CapabilityStatus};
pub use registry::CapabilityRegistry;
