//! Conversation turns.
//!
//! A [`Turn`] is one message in a session's history: who said it, the text, an
//! opaque metadata map for correlation ids and flags, and a creation timestamp.
//! History handed to the dispatcher is always chronological, oldest first; the
//! store preserves append order, so within a session turns are totally ordered.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Role::Human),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One exchange unit in a conversation. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Opaque key-value metadata (request id, fast-path flag, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
    /// Unix milliseconds at creation. Ordering within a session follows this,
    /// with store insertion order breaking ties.
    pub created: i64,
}

impl Turn {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Turn {
            role,
            content: content.into(),
            metadata: Map::new(),
            created: Utc::now().timestamp_millis(),
        }
    }

    pub fn human<S: Into<String>>(content: S) -> Self {
        Turn::new(Role::Human, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Turn::new(Role::Assistant, content)
    }

    pub fn with_metadata<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
