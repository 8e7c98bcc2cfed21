//! Session history persistence.
//!
//! A session is a named stream of [`Turn`]s. Transports derive the session id
//! from their own addressing (for Slack, channel plus user) and the dispatcher
//! never talks to the store directly; callers fetch history, dispatch, then
//! append both sides of the exchange.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::conversation::Turn;

pub use sqlite::SqliteSessionStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The most recent `limit` turns of a session, oldest first. Unknown
    /// sessions are just empty.
    async fn fetch(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>>;

    async fn append(&self, session_id: &str, turn: &Turn) -> Result<()>;
}
