pub mod api;
pub mod ws;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Every route the server exposes, state attached.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(ws::create_ws_router())
        .with_state(state)
}
