//! Settings types for the gateway and its vendor capabilities.

use serde::{Deserialize, Serialize};

/// Top-level gateway settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Network and WebSocket server settings.
    pub server: ServerSettings,
    /// Live relay and fallback behavior.
    pub relay: RelaySettings,
    /// External vendor capabilities.
    pub vendors: VendorSettings,
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port (0 for auto-assign).
    pub port: u16,
    /// WebSocket heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout in milliseconds (disconnect after this long without a pong).
    pub heartbeat_timeout_ms: u64,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Public base URL vendors can reach for webhook callbacks.
    pub callback_base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_connections: 200,
            callback_base_url: "http://localhost:8787".to_string(),
        }
    }
}

/// Relay and fallback pipeline behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Upstream session connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-stage timeout for the fallback pipeline in milliseconds.
    pub stage_timeout_ms: u64,
    /// TTL for pending transcription jobs in seconds.
    pub job_ttl_secs: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            stage_timeout_ms: 20_000,
            // Vendor webhooks typically land within a minute; give them two.
            job_ttl_secs: 120,
        }
    }
}

/// External vendor capabilities. Each is independently optional; a missing
/// API key disables that capability with a clear "not configured" error
/// rather than a generic failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorSettings {
    /// Live conversational relay (WebSocket vendor).
    pub realtime: RealtimeVendor,
    /// Text generation (chat) vendor.
    pub chat: ChatVendor,
    /// Speech synthesis vendor.
    pub speech: SpeechVendor,
    /// Asynchronous transcription job vendor.
    pub transcription: TranscriptionVendor,
}

/// Live conversational relay vendor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeVendor {
    /// WebSocket endpoint URL.
    pub ws_url: String,
    /// API key; `None` disables the live relay (degraded mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for RealtimeVendor {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.voicevendor.example/v1/realtime".to_string(),
            api_key: None,
        }
    }
}

/// Text-generation vendor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatVendor {
    /// HTTP base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key; `None` disables the respond stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ChatVendor {
    fn default() -> Self {
        Self {
            base_url: "https://api.chatvendor.example/v1".to_string(),
            model: "companion-small".to_string(),
            api_key: None,
        }
    }
}

/// Speech-synthesis vendor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechVendor {
    /// HTTP base URL.
    pub base_url: String,
    /// Voice identifier.
    pub voice: String,
    /// API key; `None` disables the synthesize stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for SpeechVendor {
    fn default() -> Self {
        Self {
            base_url: "https://api.speechvendor.example/v1".to_string(),
            voice: chirp_voice_default(),
            api_key: None,
        }
    }
}

fn chirp_voice_default() -> String {
    "nova-child-friendly".to_string()
}

/// Asynchronous transcription job vendor (webhook-based).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionVendor {
    /// HTTP base URL.
    pub base_url: String,
    /// API key; `None` disables transcription (both sync and async).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for TranscriptionVendor {
    fn default() -> Self {
        Self {
            base_url: "https://api.scribevendor.example/v2".to_string(),
            api_key: None,
        }
    }
}
