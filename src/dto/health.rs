//! Health endpoint payload.

use serde::Serialize;

/// Snapshot returned by the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Coarse service status string.
    pub status: &'static str,
    /// Rooms with a running worker.
    pub live_rooms: usize,
}
