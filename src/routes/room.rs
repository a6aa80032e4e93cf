//! Read-only room inspection endpoint.

use axum::{Json, Router, extract::Path, extract::State, routing::get};

use crate::{
    dto::room::RoomSummary,
    dto::validation::validate_room_code,
    error::{AppError, ServiceError},
    services::room_registry,
    state::SharedState,
};

/// Return the public snapshot of one live room.
pub async fn room_summary(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let code = code.trim().to_ascii_uppercase();
    validate_room_code(&code)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))
        .map_err(AppError::from)?;

    let handle = room_registry::lookup(&state, &code)?;
    let summary = handle.summary().await?;
    Ok(Json(summary))
}

/// Configure the room routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/rooms/{code}", get(room_summary))
}
