//! WebSocket session lifecycle — one browser client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use chirp_core::frames::{ClientFrame, ServerFrame};
use chirp_core::ids::ClientId;
use chirp_relay::RelayRouter;

use crate::connection::ClientConnection;
use crate::metrics as names;

/// Outbound frame buffer per client.
const OUTBOUND_CAPACITY: usize = 256;

/// Lifetime drop budget before a slow client is disconnected.
const MAX_DROPPED_FRAMES: u64 = 512;

/// Heartbeat timing for one session.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server-initiated Ping frames.
    pub interval: Duration,
    /// How long without a Pong before the client is considered dead.
    pub timeout: Duration,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the client and sends the `connected` frame
/// 2. Routes inbound frames through the relay router
/// 3. Forwards outbound frames via the bounded send channel
/// 4. Pings periodically and disconnects unresponsive or slow clients
/// 5. Cleans up (registry removal closes any upstream session)
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: ClientId,
    router: Arc<RelayRouter>,
    heartbeat: Heartbeat,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_CAPACITY);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    info!("client connected");
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(names::WS_CONNECTIONS_ACTIVE).increment(1.0);

    router.registry().on_connect(client_id.clone()).await;

    let connected = ServerFrame::Connected {
        client_id: client_id.to_string(),
    };
    if let Ok(json) = serde_json::to_string(&connected) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let outbound_conn = connection.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat.interval);
        // Skip the immediate first tick.
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let Ok(json) = serde_json::to_string(&frame) else { continue };
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > heartbeat.timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", heartbeat.timeout);
                        break;
                    }
                    if outbound_conn.drop_count() > MAX_DROPPED_FRAMES {
                        warn!(
                            drops = outbound_conn.drop_count(),
                            "client too slow to keep up, disconnecting"
                        );
                        counter!(names::WS_SLOW_CLIENT_DROPS_TOTAL)
                            .increment(outbound_conn.drop_count());
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Router output goes through `try_send` so a full socket channel counts
    // drops against the client instead of stalling frame handling.
    let (relay_tx, relay_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_CAPACITY);
    drop(tokio::spawn(pump_relay_frames(connection.clone(), relay_rx)));

    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    debug!(len = data.len(), "non-UTF8 binary frame ignored");
                    None
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };
        let Some(text) = text else { continue };
        connection.mark_alive();

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => router.handle_frame(&client_id, frame, &relay_tx).await,
            Err(e) => {
                debug!(error = %e, "unparseable frame");
                let _ = relay_tx
                    .send(ServerFrame::error("I couldn't understand that message."))
                    .await;
            }
        }
    }

    info!(age = ?connection.age(), "client disconnected");
    counter!(names::WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(names::WS_CONNECTIONS_ACTIVE).decrement(1.0);
    outbound.abort();
    router.registry().on_disconnect(&client_id).await;
}

/// Drain router output into the bounded socket channel without awaiting.
/// Full-channel drops are counted against the client, feeding the
/// slow-client disconnect in the heartbeat loop.
async fn pump_relay_frames(
    connection: Arc<ClientConnection>,
    mut frames: mpsc::Receiver<ServerFrame>,
) {
    while let Some(frame) = frames.recv().await {
        let _ = connection.try_send(frame);
    }
}

#[cfg(test)]
mod tests {
    // Session behavior over a live socket is covered by tests/integration.rs;
    // frame parsing and connection bookkeeping are unit-tested in their own
    // modules.

    use super::*;

    #[test]
    fn connected_frame_shape() {
        let frame = ServerFrame::Connected {
            client_id: "conn_1".into(),
        };
        let v: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "connected");
        assert_eq!(v["clientId"], "conn_1");
    }

    #[tokio::test]
    async fn relay_pump_counts_drops_on_a_full_socket_channel() {
        let (sock_tx, mut sock_rx) = mpsc::channel(1);
        let connection = Arc::new(ClientConnection::new(ClientId::from("conn_slow"), sock_tx));
        let (relay_tx, relay_rx) = mpsc::channel(8);
        let pump = tokio::spawn(pump_relay_frames(connection.clone(), relay_rx));

        for i in 0..4 {
            relay_tx
                .send(ServerFrame::ack(format!("frame-{i}")))
                .await
                .unwrap();
        }
        drop(relay_tx);
        pump.await.unwrap();

        // One frame fits the socket channel; the rest are counted drops.
        assert_eq!(sock_rx.recv().await, Some(ServerFrame::ack("frame-0")));
        assert_eq!(connection.drop_count(), 3);
    }
}
