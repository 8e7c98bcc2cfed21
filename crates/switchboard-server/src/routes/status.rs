use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use switchboard::CapabilityStatus;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CapabilityReport {
    pub name: String,
    pub status: CapabilityStatus,
    /// Start-failure detail, present only for failed capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<CapabilityReport>,
}

#[utoipa::path(get, path = "/status",
    responses(
        (status = 200, description = "Service health and per-capability status", body = StatusResponse),
    ),
    tag = "Status"
)]
async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let mut capabilities = Vec::with_capacity(state.registry.len());
    for handle in state.registry.iter() {
        capabilities.push(CapabilityReport {
            name: handle.name().to_string(),
            status: handle.status().await,
            detail: handle.failure().await,
        });
    }
    capabilities.sort_by(|a, b| a.name.cmp(&b.name));

    Json(StatusResponse {
        name: "switchboard".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        capabilities,
    })
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .with_state(state)
}
