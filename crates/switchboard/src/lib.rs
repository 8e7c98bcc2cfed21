//! Switchboard core: routes natural-language requests to specialist capability
//! handlers and composes their results into a single reply.
//!
//! The pieces, leaf first: [`conversation`] holds the turn model transports and
//! stores exchange, [`capability`] owns the MCP-backed handles and their registry,
//! [`providers`] abstracts the reasoning model, [`dispatch`] is the orchestration
//! core that ties them together, and [`session`] persists conversation history.

pub mod capability;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod model;
pub mod providers;
pub mod session;

pub use capability::{CapabilityDescriptor, CapabilityHandle, CapabilityRegistry, CapabilityStatus};
pub use conversation::{Role, Turn};
pub use dispatch::{DispatchOutcome, DispatchRequest, DispatchResult, Dispatcher};
pub use session::SessionStore;
