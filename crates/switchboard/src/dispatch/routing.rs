//! Builds the reasoning surface for a dispatch round: the delegation tools
//! offered to the provider, the routing system prompt, and the transcript
//! seeded from session history.

use indoc::formatdoc;
use serde_json::{json, Value};

use crate::conversation::{Role, Turn};
use crate::providers::{ChatMessage, ToolSpec};

/// One delegation tool per running capability. Calling the tool hands that
/// capability a task description.
pub fn delegation_tools(available: &[(String, String)]) -> Vec<ToolSpec> {
    available
        .iter()
        .map(|(name, description)| {
            ToolSpec::new(
                name.clone(),
                description.clone(),
                json!({
                    "type": "object",
                    "properties": {
                        "task": {
                            "type": "string",
                            "description": "The task to hand to this capability, self-contained and specific"
                        }
                    },
                    "required": ["task"]
                }),
            )
        })
        .collect()
}

pub fn system_prompt(available: &[(String, String)]) -> String {
    let capability_list = if available.is_empty() {
        "(none are currently running)".to_string()
    } else {
        available
            .iter()
            .map(|(name, description)| format!("- {name}: {description}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    formatdoc! {r#"
        You are switchboard, an assistant that routes requests to specialist
        capabilities. Decide for each request whether to answer directly or to
        delegate parts of it.

        Capabilities you can delegate to:
        {capabilities}

        When a request needs a capability, call its tool with a self-contained
        task description; you may call several in one go when the work is
        independent. Their results come back to you, and only you answer the
        requester. Never mention tools or delegation in the final reply. Answer
        in plain conversational text, concise enough for a chat message.
    "#,
        capabilities = capability_list,
    }
}

/// Session history followed by the fresh query, oldest turn first.
pub fn initial_messages(history: &[Turn], query: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|turn| match turn.role {
            Role::Human => ChatMessage::user(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant(turn.content.clone()),
        })
        .collect();
    messages.push(ChatMessage::user(query));
    messages
}

/// The task string out of a delegation call's arguments.
pub fn task_text(arguments: &Value) -> Option<String> {
    arguments
        .get("task")
        .and_then(Value::as_str)
        .map(str::to_string)
}
