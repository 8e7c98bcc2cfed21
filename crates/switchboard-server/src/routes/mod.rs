pub mod dispatch;
pub mod sessions;
pub mod slack;
pub mod status;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub fn configure(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status::routes(state.clone()))
        .merge(dispatch::routes(state.clone()))
        .merge(sessions::routes(state.clone()))
        .merge(slack::routes(state))
}
