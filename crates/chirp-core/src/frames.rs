//! Browser wire-format frames matching the web client's WebSocket protocol.

use serde::{Deserialize, Serialize};

/// Incoming frame from a browser client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Request a live upstream conversation session.
    SessionStart,
    /// One chunk of recorded audio (base64).
    AudioChunk {
        /// Base64-encoded audio bytes.
        audio: String,
    },
    /// A typed text message (never carried over the live voice channel).
    TextMessage {
        /// The message text.
        text: String,
    },
}

/// Outgoing frame to a browser client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Sent once immediately after the socket is accepted.
    Connected {
        /// Opaque connection identifier assigned by the server.
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Answer to `session-start`.
    SessionReady {
        /// `"live"` when an upstream session opened, `"degraded"` otherwise.
        mode: SessionMode,
    },
    /// Acknowledges receipt of a frame so the UI can reflect state.
    Ack {
        /// What was acknowledged (e.g. `"audio-chunk"`).
        of: String,
    },
    /// Synthesized or relayed audio output (base64).
    AudioChunk {
        /// Base64-encoded audio bytes.
        audio: String,
    },
    /// A complete text response from the AI.
    AiResponse {
        /// The response text.
        text: String,
    },
    /// What the platform heard (echo of the transcript).
    Transcript {
        /// The transcribed text.
        text: String,
    },
    /// Human-readable error. Always sent rather than silence.
    Error {
        /// What went wrong, phrased for the user.
        message: String,
    },
}

/// Whether the browser got a live relay or the degraded pipeline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// A live upstream session is open; audio is relayed.
    Live,
    /// No upstream session; audio goes through the fallback pipeline.
    Degraded,
}

impl ServerFrame {
    /// Build an error frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Build an ack frame.
    pub fn ack(of: impl Into<String>) -> Self {
        Self::Ack { of: of.into() }
    }
}
