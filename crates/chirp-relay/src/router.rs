//! Frame routing: live relay when a session is open, fallback otherwise.
//!
//! Every inbound frame produces at least one outbound frame: an ack, result
//! frames, or an explicit error. A frame is never silently dropped, and a
//! single audio chunk goes to exactly one path — the live relay or the
//! fallback pipeline, never both.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use chirp_core::frames::{ClientFrame, ServerFrame, SessionMode};
use chirp_core::ids::ClientId;
use chirp_vendors::transcription::normalize_base64;

use crate::fallback::{ConversationTurn, FallbackPipeline, PipelineOutcome};
use crate::registry::{ClientRegistry, InstallOutcome};
use crate::upstream::{SessionEvent, SessionState, UpstreamConnector, UpstreamSession};

/// Browsers record and ship WebM/Opus chunks.
const BROWSER_AUDIO_MIME: &str = "audio/webm";

/// Routes typed browser frames for one gateway instance.
pub struct RelayRouter {
    registry: Arc<ClientRegistry>,
    /// `None` when the live relay has no credentials; everything degrades.
    connector: Option<Arc<dyn UpstreamConnector>>,
    fallback: Arc<FallbackPipeline>,
    connect_timeout: Duration,
}

impl RelayRouter {
    /// Assemble the router.
    #[must_use]
    pub fn new(
        registry: Arc<ClientRegistry>,
        connector: Option<Arc<dyn UpstreamConnector>>,
        fallback: Arc<FallbackPipeline>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connector,
            fallback,
            connect_timeout,
        }
    }

    /// The registry this router installs sessions into.
    #[must_use]
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Handle one inbound frame, sending responses on `outbound`.
    pub async fn handle_frame(
        &self,
        client_id: &ClientId,
        frame: ClientFrame,
        outbound: &mpsc::Sender<ServerFrame>,
    ) {
        match frame {
            ClientFrame::SessionStart => self.handle_session_start(client_id, outbound).await,
            ClientFrame::AudioChunk { audio } => {
                self.handle_audio_chunk(client_id, audio, outbound).await;
            }
            ClientFrame::TextMessage { text } => self.handle_text_message(&text, outbound).await,
        }
    }

    async fn handle_session_start(
        &self,
        client_id: &ClientId,
        outbound: &mpsc::Sender<ServerFrame>,
    ) {
        if let Some(existing) = self.registry.get(client_id).await {
            if !existing.state().is_terminal() {
                debug!(%client_id, "session-start with a session already live");
                send(outbound, ready(SessionMode::Live)).await;
                return;
            }
        }

        let Some(connector) = &self.connector else {
            send(outbound, ready(SessionMode::Degraded)).await;
            return;
        };

        let started = tokio::time::Instant::now();
        match UpstreamSession::connect(Arc::clone(connector), self.connect_timeout).await {
            Ok((session, events)) => {
                let handle = session.clone();
                match self.registry.install(client_id, session).await {
                    InstallOutcome::Installed { previous } => {
                        if let Some(stale) = previous {
                            stale.close().await;
                        }
                        drop(tokio::spawn(pump_session_events(events, outbound.clone())));
                        // Only ack "live" once the session is actually open;
                        // the dial and the open wait share one time budget.
                        let remaining = self.connect_timeout.saturating_sub(started.elapsed());
                        let opened =
                            tokio::time::timeout(remaining, handle.wait_until_open()).await;
                        if matches!(opened, Ok(true)) {
                            send(outbound, ready(SessionMode::Live)).await;
                        } else {
                            warn!(%client_id, "session did not open in time, degrading");
                            handle.close().await;
                            send(outbound, ready(SessionMode::Degraded)).await;
                        }
                    }
                    InstallOutcome::ClientGone(session) => {
                        // Disconnected mid-dial; don't leave the socket open.
                        warn!(%client_id, "client gone before session install");
                        session.close().await;
                    }
                }
            }
            // Degraded is an answer, not an error.
            Err(e) => {
                warn!(%client_id, error = %e, "upstream connect failed, degrading");
                send(outbound, ready(SessionMode::Degraded)).await;
            }
        }
    }

    async fn handle_audio_chunk(
        &self,
        client_id: &ClientId,
        audio: String,
        outbound: &mpsc::Sender<ServerFrame>,
    ) {
        if let Some(session) = self.registry.get(client_id).await {
            if session.state() == SessionState::Open {
                match session.send_audio(audio.clone()).await {
                    Ok(()) => {
                        send(outbound, ServerFrame::ack("audio-chunk")).await;
                        return;
                    }
                    // Session died under us; this chunk still gets answered,
                    // through the fallback, exactly once.
                    Err(e) => {
                        warn!(%client_id, error = %e, "live forward failed, falling back for this chunk");
                    }
                }
            }
        }

        let Ok(bytes) = BASE64.decode(normalize_base64(&audio)) else {
            send(outbound, ServerFrame::error("That audio couldn't be read.")).await;
            return;
        };

        match self.fallback.voice_turn(&bytes, BROWSER_AUDIO_MIME).await {
            PipelineOutcome::NoSpeech => {
                send(
                    outbound,
                    ServerFrame::error("I didn't hear anything. Try speaking again?"),
                )
                .await;
            }
            PipelineOutcome::Turn(turn) => send_turn(turn, outbound).await,
        }
    }

    async fn handle_text_message(&self, text: &str, outbound: &mpsc::Sender<ServerFrame>) {
        if text.trim().is_empty() {
            send(outbound, ServerFrame::error("There was no text in that message.")).await;
            return;
        }
        let turn = self.fallback.text_turn(text).await;
        send_turn(turn, outbound).await;
    }
}

fn ready(mode: SessionMode) -> ServerFrame {
    ServerFrame::SessionReady { mode }
}

async fn send(outbound: &mpsc::Sender<ServerFrame>, frame: ServerFrame) {
    // A closed channel means the client disconnected; nothing left to tell.
    let _ = outbound.send(frame).await;
}

async fn send_turn(turn: ConversationTurn, outbound: &mpsc::Sender<ServerFrame>) {
    if let Some(text) = turn.transcript {
        send(outbound, ServerFrame::Transcript { text }).await;
    }
    if let Some(text) = turn.reply {
        send(outbound, ServerFrame::AiResponse { text }).await;
    }
    if let Some(audio) = turn.audio {
        send(
            outbound,
            ServerFrame::AudioChunk {
                audio: BASE64.encode(&audio),
            },
        )
        .await;
    }
    if let Some(failure) = turn.failure {
        send(outbound, ServerFrame::error(failure.user_message())).await;
    }
}

/// Forward session actor events to the client as frames until it closes.
async fn pump_session_events(
    mut events: mpsc::Receiver<SessionEvent>,
    outbound: mpsc::Sender<ServerFrame>,
) {
    while let Some(event) = events.recv().await {
        let frame = match event {
            SessionEvent::Opened => continue,
            SessionEvent::PartialTranscript(text) => ServerFrame::Transcript { text },
            SessionEvent::AudioChunk(audio) => ServerFrame::AudioChunk { audio },
            SessionEvent::FinalText(text) => ServerFrame::AiResponse { text },
            SessionEvent::VendorError(message) => {
                ServerFrame::error(format!("The live conversation hit a problem: {message}"))
            }
            SessionEvent::Closed => break,
        };
        if outbound.send(frame).await.is_err() {
            break;
        }
    }
}
