use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::state::{AppState, SlackState};

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    challenge: Option<String>,
    api_app_id: Option<String>,
    event: Option<MessageEvent>,
}

/// The subset of Slack message event fields this service acts on. Everything
/// is optional because the envelope carries many other event shapes.
#[derive(Debug, Deserialize)]
struct MessageEvent {
    #[serde(rename = "type")]
    kind: String,
    subtype: Option<String>,
    bot_id: Option<String>,
    user: Option<String>,
    channel: Option<String>,
    #[serde(default)]
    text: String,
    event_ts: Option<String>,
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Slack events callback. Signature verification replaces bearer auth here;
/// the raw body must be checked before any JSON parsing. Real messages are
/// acked immediately and processed on a detached task, with the reply posted
/// back through the Web API.
async fn events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(slack) = state.slack.clone() else {
        warn!("slack event received but no signing secret is configured");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let timestamp = header_str(&headers, "x-slack-request-timestamp");
    let signature = header_str(&headers, "x-slack-signature");
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        warn!("slack request missing signature headers");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let body = std::str::from_utf8(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    if let Err(error) = slack.verifier.verify(timestamp, signature, body) {
        warn!(error = %error, "rejected slack request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let envelope: EventEnvelope =
        serde_json::from_str(body).map_err(|_| StatusCode::BAD_REQUEST)?;

    match envelope.kind.as_str() {
        "url_verification" => {
            info!("answering slack url verification challenge");
            Ok(Json(json!({ "challenge": envelope.challenge })))
        }
        "event_callback" => {
            if let Some(event) = envelope.event {
                maybe_schedule(state, slack, envelope.api_app_id, event);
            }
            Ok(Json(json!({ "ok": true })))
        }
        other => {
            debug!(kind = %other, "ignoring slack payload type");
            Ok(Json(json!({ "ok": true })))
        }
    }
}

/// Kick off background processing when the event is a plain user message.
/// Bot traffic and subtyped messages (edits, joins, bot posts) are dropped.
fn maybe_schedule(
    state: Arc<AppState>,
    slack: Arc<SlackState>,
    api_app_id: Option<String>,
    event: MessageEvent,
) {
    if event.kind != "message" || event.subtype.is_some() || event.bot_id.is_some() {
        debug!(kind = %event.kind, "ignoring non-user slack event");
        return;
    }
    let (Some(user), Some(channel)) = (event.user, event.channel) else {
        debug!("ignoring message event without user and channel");
        return;
    };

    let text = event.text.trim().to_string();
    let session_id = format!("slack_session_{channel}_{user}");
    let event_ts = event
        .event_ts
        .unwrap_or_else(|| chrono::Utc::now().timestamp().to_string());
    let request_id = format!(
        "{}_{}",
        api_app_id.as_deref().unwrap_or("unknown_app"),
        event_ts
    );
    info!(
        session_id = %session_id,
        request_id = %request_id,
        "accepted slack message"
    );

    tokio::spawn(async move {
        let result = state
            .process_query(&session_id, &user, &text, &request_id)
            .await;
        match &slack.client {
            Some(client) => {
                if let Err(error) = client.post_message(&channel, result.user_text()).await {
                    error!(channel = %channel, error = %error, "failed to post slack reply");
                }
            }
            None => {
                warn!(channel = %channel, "no slack bot token configured, dropping reply");
            }
        }
    });
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .with_state(state)
}
