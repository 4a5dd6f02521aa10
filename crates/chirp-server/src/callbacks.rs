//! Vendor webhook receiver.
//!
//! The transcription vendor POSTs job results here. The handler resolves
//! the matching pending callback and always answers `200 {"received":true}`,
//! even for malformed or stale payloads. Stale callbacks are logged and
//! counted, never retried.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use chirp_core::ids::JobId;
use chirp_relay::{CallbackOutcome, CorrelationStore};

use crate::server::AppState;

/// Webhook body shape.
#[derive(Debug, Deserialize)]
pub struct TranscriptionCallback {
    /// Vendor-assigned job id.
    pub id: String,
    /// `completed`, `error`, or a progress status.
    pub status: String,
    /// Transcript text (on `completed`).
    #[serde(default)]
    pub text: Option<String>,
    /// Error description (on `error`).
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /callbacks/transcription`
pub async fn transcription_callback(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    apply_callback(state.store.as_ref(), &body);
    Json(json!({"received": true}))
}

/// Apply one webhook payload to the store. Malformed payloads and unknown
/// statuses are logged and ignored; progress statuses keep the entry
/// pending.
pub fn apply_callback(store: &CorrelationStore, body: &[u8]) {
    let callback: TranscriptionCallback = match serde_json::from_slice(body) {
        Ok(cb) => cb,
        Err(e) => {
            warn!(error = %e, "malformed transcription callback");
            return;
        }
    };

    let job_id = JobId::from(callback.id.as_str());
    match callback.status.as_str() {
        "completed" => {
            let _ = store.resolve(
                &job_id,
                CallbackOutcome::Completed {
                    text: callback.text.unwrap_or_default(),
                },
            );
        }
        "error" => {
            let _ = store.resolve(
                &job_id,
                CallbackOutcome::Failed {
                    message: callback
                        .error
                        .unwrap_or_else(|| "transcription failed".to_string()),
                },
            );
        }
        "processing" | "queued" => {
            debug!(%job_id, status = %callback.status, "job still in progress");
        }
        other => {
            warn!(%job_id, status = other, "unknown callback status");
        }
    }
}
