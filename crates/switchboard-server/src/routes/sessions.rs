use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use switchboard::Turn;
use tracing::error;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TurnsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TurnsResponse {
    pub session_id: String,
    /// Oldest first; replies carry their request id in turn metadata.
    pub turns: Vec<Turn>,
}

/// Read back a session's recent history. This is how REST callers observe
/// the reply to a dispatch they were only acked for.
#[utoipa::path(get, path = "/api/sessions/{session_id}/turns",
    params(
        ("session_id" = String, Path, description = "Session whose turns to fetch"),
        ("limit" = Option<usize>, Query, description = "Maximum turns to return, newest kept"),
    ),
    responses(
        (status = 200, description = "The session's most recent turns, oldest first", body = TurnsResponse),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("api_key" = [])),
    tag = "Sessions"
)]
async fn turns(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<TurnsQuery>,
) -> Result<Json<TurnsResponse>, StatusCode> {
    let limit = query.limit.unwrap_or(state.history_limit);
    let turns = state.store.fetch(&session_id, limit).await.map_err(|error| {
        error!(session_id, error = %error, "failed to fetch session turns");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(TurnsResponse { session_id, turns }))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sessions/{session_id}/turns", get(turns))
        .with_state(state)
}
