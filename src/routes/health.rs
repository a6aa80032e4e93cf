//! Health probe endpoint.

use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::health::HealthResponse, services::room_registry, state::SharedState};

/// Return the current health status of the backend.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        live_rooms: room_registry::live_room_count(&state),
    })
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/health", get(healthcheck))
}
