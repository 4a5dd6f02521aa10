//! Per-client WebSocket connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use chirp_core::frames::ServerFrame;
use chirp_core::ids::ClientId;

/// One connected browser client: identity, the bounded outbound channel,
/// and ping/pong liveness bookkeeping.
pub struct ClientConnection {
    /// Unique connection ID, assigned at accept.
    pub id: ClientId,
    /// Outbound frames toward the socket write task.
    tx: mpsc::Sender<ServerFrame>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Frames dropped because the outbound channel was full.
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection around its outbound channel.
    #[must_use]
    pub fn new(id: ClientId, tx: mpsc::Sender<ServerFrame>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Try to enqueue a frame without waiting.
    ///
    /// Returns `false` when the channel is full or closed; full-channel
    /// drops are counted so slow clients can be disconnected.
    pub fn try_send(&self, frame: ServerFrame) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Record client activity (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the client last showed signs of life.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for the heartbeat cycle.
    ///
    /// Returns `true` if the client was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(32);
        (ClientConnection::new(ClientId::from("conn_1"), tx), rx)
    }

    #[tokio::test]
    async fn try_send_delivers_frames() {
        let (conn, mut rx) = make_connection();
        assert!(conn.try_send(ServerFrame::ack("audio-chunk")));
        assert_eq!(rx.recv().await, Some(ServerFrame::ack("audio-chunk")));
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn full_channel_counts_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(ClientId::from("conn_slow"), tx);
        assert!(conn.try_send(ServerFrame::ack("a")));
        assert!(!conn.try_send(ServerFrame::ack("b")));
        assert!(!conn.try_send(ServerFrame::ack("c")));
        assert_eq!(conn.drop_count(), 2);
    }

    #[tokio::test]
    async fn closed_channel_counts_as_drop() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(ClientId::from("conn_gone"), tx);
        drop(rx);
        assert!(!conn.try_send(ServerFrame::ack("a")));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn alive_flag_resets_on_check() {
        let (conn, _rx) = make_connection();
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection();
        let before = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > before);
    }
}
