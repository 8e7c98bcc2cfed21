use std::sync::Arc;

use axum::extract::State;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DispatchPayload {
    pub query: String,
    pub user_id: String,
    pub session_id: String,
    /// Correlation id; generated when the caller does not supply one.
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DispatchAck {
    pub success: bool,
    pub request_id: String,
}

/// Accept a request and process it in the background. The ack only means
/// the request was recorded for processing; the reply lands in the session
/// store and can be read back through the sessions endpoint.
#[utoipa::path(post, path = "/api/dispatch",
    request_body = DispatchPayload,
    responses(
        (status = 200, description = "Request accepted for background processing", body = DispatchAck),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("api_key" = [])),
    tag = "Dispatch"
)]
async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchPayload>,
) -> Json<DispatchAck> {
    let request_id = payload
        .request_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(
        session_id = %payload.session_id,
        request_id = %request_id,
        "accepted dispatch request"
    );

    let task_id = request_id.clone();
    tokio::spawn(async move {
        state
            .process_query(
                &payload.session_id,
                &payload.user_id,
                &payload.query,
                &task_id,
            )
            .await;
    });

    Json(DispatchAck {
        success: true,
        request_id,
    })
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/dispatch", post(dispatch))
        .with_state(state)
}
