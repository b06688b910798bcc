pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod rooms;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;

/// Every chat route, behind bearer-token auth.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chatrooms", post(rooms::create_room).get(rooms::list_rooms))
        .route("/chatrooms/{id}", get(rooms::get_room).delete(rooms::delete_room))
        .route("/chatrooms/{id}/join", post(rooms::join_room))
        .route("/chatrooms/{id}/leave", post(rooms::leave_room))
        .route("/messages/send", post(messages::send_message))
        .route("/messages/generate-key", post(messages::generate_key))
        .route("/messages/{id}", get(messages::get_messages))
        .route("/messages/{id}/read", post(messages::mark_read))
        .route("/messages/{id}/unread", post(messages::mark_unread))
        .route("/messages/{id}/delivered", post(messages::mark_delivered))
        .route("/messages/{id}/undelivered", post(messages::mark_undelivered))
        .route("/messages/{id}/status", get(messages::get_status))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}
