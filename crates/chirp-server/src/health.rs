//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently connected browser clients.
    pub connections: usize,
    /// Upstream sessions currently open.
    pub live_sessions: usize,
    /// Transcription callbacks awaiting resolution.
    pub pending_callbacks: usize,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(
    start_time: Instant,
    connections: usize,
    live_sessions: usize,
    pending_callbacks: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        live_sessions,
        pending_callbacks,
    }
}
