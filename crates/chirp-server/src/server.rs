//! `GatewayServer` — axum HTTP + WebSocket server wiring.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chirp_core::ids::ClientId;
use chirp_relay::upstream::UpstreamConnector;
use chirp_relay::{
    CallbackOutcome, ClientRegistry, CorrelationStore, FallbackPipeline, RelayRouter,
    TranscriptionGateway, TungsteniteConnector,
};
use chirp_settings::types::GatewaySettings;
use chirp_vendors::transcription::normalize_base64;
use chirp_vendors::{ChatClient, SpeechClient, TranscriptionClient, VendorError};

use crate::callbacks;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::ws::{Heartbeat, run_ws_session};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Frame router (owns the client registry).
    pub router: Arc<RelayRouter>,
    /// Async transcription with callback correlation.
    pub transcription: Arc<TranscriptionGateway>,
    /// Pending-callback store the webhook handler resolves into.
    pub store: Arc<CorrelationStore>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Full gateway settings.
    pub settings: Arc<GatewaySettings>,
    /// Prometheus render handle, when the recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The gateway server.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Wire the server from settings: vendor clients, the fallback
    /// pipeline, the live-relay connector (only when credentials exist),
    /// the registry, and the correlation store.
    #[must_use]
    pub fn new(settings: GatewaySettings) -> Self {
        let vendors = &settings.vendors;

        let pipeline = Arc::new(FallbackPipeline::new(
            TranscriptionClient::new(vendors.transcription.clone()),
            ChatClient::new(vendors.chat.clone()),
            SpeechClient::new(vendors.speech.clone()),
            Duration::from_millis(settings.relay.stage_timeout_ms),
        ));

        let connector = vendors.realtime.api_key.clone().map(|key| {
            Arc::new(TungsteniteConnector::new(
                vendors.realtime.ws_url.clone(),
                key,
            )) as Arc<dyn UpstreamConnector>
        });
        if connector.is_none() {
            info!("live relay not configured, all sessions will be degraded");
        }

        let router = Arc::new(RelayRouter::new(
            Arc::new(ClientRegistry::new()),
            connector,
            pipeline,
            Duration::from_millis(settings.relay.connect_timeout_ms),
        ));

        let store = CorrelationStore::new();
        let callback_url = format!(
            "{}/callbacks/transcription",
            settings.server.callback_base_url.trim_end_matches('/')
        );
        let transcription = Arc::new(TranscriptionGateway::new(
            TranscriptionClient::new(vendors.transcription.clone()),
            Arc::clone(&store),
            callback_url,
            Duration::from_secs(settings.relay.job_ttl_secs),
        ));

        Self {
            state: AppState {
                router,
                transcription,
                store,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                settings: Arc::new(settings),
                metrics: None,
            },
        }
    }

    /// Attach an installed Prometheus recorder for `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Build the axum router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/transcribe", post(transcribe_handler))
            .route(
                "/callbacks/transcription",
                post(callbacks::transcription_callback),
            )
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown token fires.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let token = self.state.shutdown.token();
        info!(addr = %listener.local_addr()?, "gateway listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await
    }
}

/// GET /ws
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let registry = state.router.registry();
    if registry.connected_count().await >= state.settings.server.max_connections {
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let heartbeat = Heartbeat {
        interval: Duration::from_millis(state.settings.server.heartbeat_interval_ms),
        timeout: Duration::from_millis(state.settings.server.heartbeat_timeout_ms),
    };
    let router = Arc::clone(&state.router);
    ws.on_upgrade(move |socket| run_ws_session(socket, ClientId::new(), router, heartbeat))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.router.registry();
    Json(health::health_check(
        state.start_time,
        registry.connected_count().await,
        registry.live_session_count().await,
        state.store.pending_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, crate::metrics::render(handle)).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

fn default_mime() -> String {
    "audio/webm".to_string()
}

/// `POST /api/transcribe` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscribeRequest {
    /// Base64 audio, optionally with a data-URI prefix.
    audio: String,
    #[serde(default = "default_mime")]
    mime_type: String,
}

/// POST /api/transcribe — pending response until the webhook or TTL.
async fn transcribe_handler(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> Response {
    let Ok(audio) = BASE64.decode(normalize_base64(&request.audio)) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "audio is not valid base64"})),
        )
            .into_response();
    };

    match state
        .transcription
        .transcribe(&audio, &request.mime_type)
        .await
    {
        Ok(CallbackOutcome::Completed { text }) => {
            (StatusCode::OK, Json(json!({"text": text}))).into_response()
        }
        Ok(CallbackOutcome::Failed { message }) => {
            (StatusCode::BAD_GATEWAY, Json(json!({"error": message}))).into_response()
        }
        Ok(CallbackOutcome::TimedOut) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({"error": "transcription timed out"})),
        )
            .into_response(),
        Err(e @ VendorError::InvalidInput { .. }) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response()
        }
        Err(e @ VendorError::NotConfigured { .. }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
        Err(e) => {
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}
