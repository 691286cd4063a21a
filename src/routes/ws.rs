//! Client WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws::ws_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the client WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade for a duplex voice session
///
/// # Example
///
/// ```javascript
/// // Browser client; the shared secret is the only offered subprotocol
/// const socket = new WebSocket("wss://bridge.example.com/ws", ["<API_KEY>"]);
/// socket.send(base64Pcm16kMono);
/// ```
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
}
