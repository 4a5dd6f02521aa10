//! Outbound vendor WebSocket session actor.
//!
//! One actor per client. The actor owns the socket; callers hold an
//! [`UpstreamHandle`] (command channel + watch-published state) and an event
//! receiver. A dedicated writer task owns the sink so the read loop is never
//! starved by a slow send. State moves `connecting → open → {closed|failed}`
//! and never backwards; the router reads it through the watch channel to
//! decide between live forwarding and the fallback pipeline.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use chirp_core::metrics::{UPSTREAM_SESSIONS_CLOSED_TOTAL, UPSTREAM_SESSIONS_OPENED_TOTAL};
use chirp_core::persona;

const CMD_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 64;
const WRITE_CHANNEL_CAPACITY: usize = 32;

/// Session lifecycle state, watch-published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Dialing the vendor.
    Connecting,
    /// Socket up, init frame sent, audio accepted.
    Open,
    /// Closed deliberately (client close or vendor close frame).
    Closed,
    /// Transport or vendor error ended the session.
    Failed,
}

impl SessionState {
    /// Whether the session can never accept audio again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Events the actor emits toward the owning connection task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Init frame sent; audio now accepted.
    Opened,
    /// Interim transcript of what the vendor is hearing.
    PartialTranscript(String),
    /// Synthesized audio from the vendor (base64, forwarded verbatim).
    AudioChunk(String),
    /// A complete text response.
    FinalText(String),
    /// Vendor-reported error; the session is failing.
    VendorError(String),
    /// Terminal: the actor has stopped.
    Closed,
}

enum Command {
    Audio(String),
    Close,
}

/// Errors from dialing or driving an upstream session.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The dial did not complete within the configured window.
    #[error("upstream connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    /// WebSocket transport error.
    #[error("upstream transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    /// The realtime capability has no credentials configured.
    #[error("live relay is not configured (missing API key)")]
    NotConfigured,
    /// The session is not in the `open` state.
    #[error("upstream session is not open")]
    NotOpen,
}

/// Boxed message sink half of a vendor socket.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
/// Boxed message stream half of a vendor socket.
pub type WsStream = Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// Seam between the session actor and the actual network dial, so tests can
/// hand the actor in-memory streams.
#[async_trait]
pub trait UpstreamConnector: Send + Sync + 'static {
    /// Establish the vendor socket and return its two halves.
    async fn connect(&self) -> Result<(WsSink, WsStream), UpstreamError>;
}

/// Production connector: tokio-tungstenite dial with bearer auth.
pub struct TungsteniteConnector {
    ws_url: String,
    api_key: String,
}

impl TungsteniteConnector {
    /// Build a connector for the vendor endpoint.
    #[must_use]
    pub fn new(ws_url: String, api_key: String) -> Self {
        Self { ws_url, api_key }
    }
}

#[async_trait]
impl UpstreamConnector for TungsteniteConnector {
    async fn connect(&self) -> Result<(WsSink, WsStream), UpstreamError> {
        let mut request = self.ws_url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| UpstreamError::NotConfigured)?;
        let _ = request.headers_mut().insert(AUTHORIZATION, auth);

        let (socket, _response) = connect_async(request).await?;
        let (sink, stream) = socket.split();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Caller-side handle to a running session actor.
#[derive(Clone, Debug)]
pub struct UpstreamHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<SessionState>,
}

impl UpstreamHandle {
    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// A fresh receiver for observing state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Wait until the session reaches `open`. Returns `false` when it hits
    /// a terminal state (or the actor goes away) first. Callers bound this
    /// with their own timeout.
    pub async fn wait_until_open(&self) -> bool {
        let mut state_rx = self.state_receiver();
        loop {
            let state = *state_rx.borrow_and_update();
            if state == SessionState::Open {
                return true;
            }
            if state.is_terminal() {
                return false;
            }
            if state_rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Forward one base64 audio chunk. Order of calls is the order on the
    /// wire. Fails when the session is not open.
    pub async fn send_audio(&self, audio_b64: String) -> Result<(), UpstreamError> {
        if self.state() != SessionState::Open {
            return Err(UpstreamError::NotOpen);
        }
        self.cmd_tx
            .send(Command::Audio(audio_b64))
            .await
            .map_err(|_| UpstreamError::NotOpen)
    }

    /// Ask the actor to close the vendor socket. Idempotent; returns once
    /// the command is queued (the actor drains and stops on its own).
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
    }
}

/// Factory for session actors.
pub struct UpstreamSession;

impl UpstreamSession {
    /// Dial the vendor (bounded by `connect_timeout`), send the persona
    /// init frame, and spawn the actor. Returns the handle and the event
    /// stream on success.
    pub async fn connect(
        connector: Arc<dyn UpstreamConnector>,
        connect_timeout: Duration,
    ) -> Result<(UpstreamHandle, mpsc::Receiver<SessionEvent>), UpstreamError> {
        let (sink, stream) = tokio::time::timeout(connect_timeout, connector.connect())
            .await
            .map_err(|_| UpstreamError::ConnectTimeout(connect_timeout))??;

        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        drop(tokio::spawn(run_session(
            sink, stream, cmd_rx, event_tx, state_tx,
        )));

        Ok((UpstreamHandle { cmd_tx, state_rx }, event_rx))
    }
}

/// Inbound vendor events, classified.
#[derive(Debug, PartialEq, Eq)]
enum VendorEvent {
    Partial(String),
    Audio(String),
    Response(String),
    Error(String),
}

fn parse_vendor_event(raw: &str) -> Option<VendorEvent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let kind = value.get("type")?.as_str()?;
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_default()
    };
    match kind {
        "partial" => Some(VendorEvent::Partial(field("text"))),
        "audio" => Some(VendorEvent::Audio(field("audio"))),
        "response" => Some(VendorEvent::Response(field("text"))),
        "error" => Some(VendorEvent::Error(field("message"))),
        other => {
            debug!(kind = other, "ignoring unrecognized vendor event");
            None
        }
    }
}

async fn run_session(
    mut sink: WsSink,
    mut stream: WsStream,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
) {
    // Writer task owns the sink so vendor reads are never starved.
    let (write_tx, mut write_rx) = mpsc::channel::<Message>(WRITE_CHANNEL_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(msg) = write_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // The vendor requires the persona/voice init frame before any audio.
    let init = Message::Text(persona::init_frame().to_string().into());
    if write_tx.send(init).await.is_err() {
        let _ = state_tx.send(SessionState::Failed);
        let _ = event_tx.send(SessionEvent::Closed).await;
        return;
    }
    let _ = state_tx.send(SessionState::Open);
    counter!(UPSTREAM_SESSIONS_OPENED_TOTAL).increment(1);
    let _ = event_tx.send(SessionEvent::Opened).await;

    let final_state = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Audio(audio)) => {
                    let frame = json!({"type": "audio", "audio": audio}).to_string();
                    if write_tx.send(Message::Text(frame.into())).await.is_err() {
                        break SessionState::Failed;
                    }
                }
                // All handles dropped counts as a close request.
                Some(Command::Close) | None => {
                    let _ = write_tx.send(Message::Close(None)).await;
                    break SessionState::Closed;
                }
            },
            item = stream.next() => match item {
                Some(Ok(Message::Text(text))) => match parse_vendor_event(&text) {
                    Some(VendorEvent::Partial(t)) => {
                        let _ = event_tx.send(SessionEvent::PartialTranscript(t)).await;
                    }
                    Some(VendorEvent::Audio(a)) => {
                        let _ = event_tx.send(SessionEvent::AudioChunk(a)).await;
                    }
                    Some(VendorEvent::Response(t)) => {
                        let _ = event_tx.send(SessionEvent::FinalText(t)).await;
                    }
                    Some(VendorEvent::Error(message)) => {
                        warn!(%message, "vendor reported an error");
                        let _ = event_tx.send(SessionEvent::VendorError(message)).await;
                        break SessionState::Failed;
                    }
                    None => {}
                },
                Some(Ok(Message::Ping(payload))) => {
                    if write_tx.send(Message::Pong(payload)).await.is_err() {
                        break SessionState::Failed;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break SessionState::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "upstream transport error");
                    let _ = event_tx
                        .send(SessionEvent::VendorError(e.to_string()))
                        .await;
                    break SessionState::Failed;
                }
            },
        }
    };

    let _ = state_tx.send(final_state);
    counter!(UPSTREAM_SESSIONS_CLOSED_TOTAL).increment(1);
    drop(write_tx);
    let _ = writer.await;
    let _ = event_tx.send(SessionEvent::Closed).await;
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeVendor, NeverConnector, fake_socket};
    use super::*;
    use assert_matches::assert_matches;

    async fn next_text(vendor: &mut FakeVendor) -> String {
        match vendor.written.next().await.expect("actor closed its sink") {
            Message::Text(t) => t.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn init_frame_precedes_everything_and_session_opens() {
        let (connector, mut vendor) = fake_socket();
        let (handle, mut events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();

        let first = next_text(&mut vendor).await;
        let v: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(v["type"], "session.init");
        assert_eq!(v["voice"], persona::VOICE_ID);

        assert_eq!(events.recv().await, Some(SessionEvent::Opened));
        assert_eq!(handle.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn audio_chunks_are_forwarded_in_order() {
        let (connector, mut vendor) = fake_socket();
        let (handle, mut events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));
        let _init = next_text(&mut vendor).await;

        handle.send_audio("AAAA".into()).await.unwrap();
        handle.send_audio("BBBB".into()).await.unwrap();

        let first: Value = serde_json::from_str(&next_text(&mut vendor).await).unwrap();
        let second: Value = serde_json::from_str(&next_text(&mut vendor).await).unwrap();
        assert_eq!(first["type"], "audio");
        assert_eq!(first["audio"], "AAAA");
        assert_eq!(second["audio"], "BBBB");
    }

    #[tokio::test]
    async fn vendor_ping_is_answered_with_pong() {
        let (connector, mut vendor) = fake_socket();
        let (_handle, mut events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));
        let _init = next_text(&mut vendor).await;

        vendor
            .incoming
            .unbounded_send(Message::Ping(vec![7u8, 7].into()))
            .unwrap();

        match vendor.written.next().await.unwrap() {
            Message::Pong(payload) => assert_eq!(payload.as_ref(), &[7u8, 7]),
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn vendor_events_are_classified_and_emitted() {
        let (connector, vendor) = fake_socket();
        let (_handle, mut events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));

        for raw in [
            r#"{"type": "partial", "text": "why is"}"#,
            r#"{"type": "audio", "audio": "UklG"}"#,
            r#"{"type": "response", "text": "Because sunlight scatters!"}"#,
        ] {
            vendor
                .incoming
                .unbounded_send(Message::Text(raw.to_string().into()))
                .unwrap();
        }

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::PartialTranscript("why is".into()))
        );
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::AudioChunk("UklG".into()))
        );
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::FinalText("Because sunlight scatters!".into()))
        );
    }

    #[tokio::test]
    async fn vendor_error_fails_the_session() {
        let (connector, vendor) = fake_socket();
        let (handle, mut events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));

        vendor
            .incoming
            .unbounded_send(Message::Text(
                r#"{"type": "error", "message": "quota exceeded"}"#.to_string().into(),
            ))
            .unwrap();

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::VendorError("quota exceeded".into()))
        );
        assert_eq!(events.recv().await, Some(SessionEvent::Closed));
        assert_eq!(handle.state(), SessionState::Failed);
        assert_matches!(
            handle.send_audio("AAAA".into()).await,
            Err(UpstreamError::NotOpen)
        );
    }

    #[tokio::test]
    async fn vendor_close_moves_to_closed() {
        let (connector, vendor) = fake_socket();
        let (handle, mut events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));

        vendor.incoming.unbounded_send(Message::Close(None)).unwrap();

        assert_eq!(events.recv().await, Some(SessionEvent::Closed));
        assert_eq!(handle.state(), SessionState::Closed);
        assert!(handle.state().is_terminal());
    }

    #[tokio::test]
    async fn close_command_sends_close_frame_and_stops() {
        let (connector, mut vendor) = fake_socket();
        let (handle, mut events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));
        let _init = next_text(&mut vendor).await;

        handle.close().await;

        match vendor.written.next().await.unwrap() {
            Message::Close(_) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
        assert_eq!(events.recv().await, Some(SessionEvent::Closed));
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn wait_until_open_tracks_the_state_machine() {
        let (connector, vendor) = fake_socket();
        let (handle, _events) = UpstreamSession::connect(connector, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(handle.wait_until_open().await);
        // Already open: resolves immediately.
        assert!(handle.wait_until_open().await);

        vendor.incoming.unbounded_send(Message::Close(None)).unwrap();
        let mut state_rx = handle.state_receiver();
        while !state_rx.borrow_and_update().is_terminal() {
            state_rx.changed().await.unwrap();
        }
        assert!(!handle.wait_until_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_bounded() {
        let result =
            UpstreamSession::connect(Arc::new(NeverConnector), Duration::from_secs(5)).await;
        assert_matches!(result, Err(UpstreamError::ConnectTimeout(d)) if d == Duration::from_secs(5));
    }

    #[test]
    fn parse_vendor_event_variants() {
        assert_eq!(
            parse_vendor_event(r#"{"type": "partial", "text": "he"}"#),
            Some(VendorEvent::Partial("he".into()))
        );
        assert_eq!(
            parse_vendor_event(r#"{"type": "error", "message": "boom"}"#),
            Some(VendorEvent::Error("boom".into()))
        );
        assert_eq!(parse_vendor_event(r#"{"type": "heartbeat"}"#), None);
        assert_eq!(parse_vendor_event("not json"), None);
        assert_eq!(parse_vendor_event(r#"{"text": "no type"}"#), None);
    }
}
