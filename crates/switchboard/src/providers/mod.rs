//! Reasoning providers.
//!
//! The dispatcher and each capability handle reason through a [`Provider`]: an
//! opaque completion unit that takes a system prompt, a transcript, and the tools
//! it may call, and returns text and/or tool calls. [`openai`] speaks the
//! OpenAI-compatible chat-completions wire format; [`mock`] is the scripted
//! stand-in the tests drive.

pub mod base;
pub mod errors;
pub mod formats;
pub mod mock;
pub mod openai;

pub use base::{ChatMessage, Completion, Provider, ToolCall, ToolSpec, Usage};
pub use errors::ProviderError;
pub use openai::OpenAiProvider;
