//! Per-client session registry.
//!
//! One entry per connected browser client; at most one upstream session per
//! entry. Lookups never cross client boundaries, and a disconnect always
//! closes the client's session so no vendor socket is left orphaned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use chirp_core::ids::ClientId;

use crate::upstream::{SessionState, UpstreamHandle};

/// Result of a compare-and-set install.
pub enum InstallOutcome {
    /// The session is now owned by the client; any previous session is
    /// returned for the caller to close.
    Installed {
        /// The session this one replaced, if any.
        previous: Option<UpstreamHandle>,
    },
    /// The client disconnected before the install; the caller must close
    /// the returned session immediately.
    ClientGone(UpstreamHandle),
}

/// Registry of connected clients and their upstream sessions.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Option<UpstreamHandle>>>,
    closed_sessions: AtomicUsize,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted client with no upstream session.
    pub async fn on_connect(&self, client_id: ClientId) {
        let _ = self.clients.write().await.insert(client_id, None);
    }

    /// Remove the client and close its session if one exists. Idempotent.
    pub async fn on_disconnect(&self, client_id: &ClientId) {
        let removed = self.clients.write().await.remove(client_id);
        if let Some(Some(session)) = removed {
            debug!(%client_id, "closing upstream session on disconnect");
            session.close().await;
            let _ = self.closed_sessions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// The client's current session, if any. Never another client's.
    pub async fn get(&self, client_id: &ClientId) -> Option<UpstreamHandle> {
        self.clients.read().await.get(client_id)?.clone()
    }

    /// Compare-and-set install of a freshly dialed session.
    pub async fn install(&self, client_id: &ClientId, session: UpstreamHandle) -> InstallOutcome {
        let mut clients = self.clients.write().await;
        match clients.get_mut(client_id) {
            Some(slot) => InstallOutcome::Installed {
                previous: slot.replace(session),
            },
            None => InstallOutcome::ClientGone(session),
        }
    }

    /// Number of currently connected clients.
    pub async fn connected_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Number of sessions currently in the `open` state.
    pub async fn live_session_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|slot| {
                slot.as_ref()
                    .is_some_and(|s| s.state() == SessionState::Open)
            })
            .count()
    }

    /// Total sessions this registry has closed on disconnect.
    pub fn closed_session_count(&self) -> usize {
        self.closed_sessions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::testing::idle_handle;

    #[tokio::test]
    async fn get_never_returns_a_foreign_session() {
        let registry = ClientRegistry::new();
        let alice = ClientId::from("conn_alice");
        let bob = ClientId::from("conn_bob");
        registry.on_connect(alice.clone()).await;
        registry.on_connect(bob.clone()).await;

        let session = idle_handle(SessionState::Open);
        assert!(matches!(
            registry.install(&alice, session).await,
            InstallOutcome::Installed { previous: None }
        ));

        assert!(registry.get(&alice).await.is_some());
        assert!(registry.get(&bob).await.is_none());
        assert!(registry.get(&ClientId::from("conn_nobody")).await.is_none());
    }

    #[tokio::test]
    async fn install_replaces_and_returns_previous() {
        let registry = ClientRegistry::new();
        let client = ClientId::from("conn_1");
        registry.on_connect(client.clone()).await;

        let first = idle_handle(SessionState::Open);
        let second = idle_handle(SessionState::Open);
        assert!(matches!(
            registry.install(&client, first).await,
            InstallOutcome::Installed { previous: None }
        ));
        assert!(matches!(
            registry.install(&client, second).await,
            InstallOutcome::Installed { previous: Some(_) }
        ));
    }

    #[tokio::test]
    async fn install_after_disconnect_is_rejected() {
        let registry = ClientRegistry::new();
        let client = ClientId::from("conn_1");
        registry.on_connect(client.clone()).await;
        registry.on_disconnect(&client).await;

        let session = idle_handle(SessionState::Open);
        assert!(matches!(
            registry.install(&client, session).await,
            InstallOutcome::ClientGone(_)
        ));
        assert_eq!(registry.connected_count().await, 0);
    }

    #[tokio::test]
    async fn disconnect_closes_the_session_and_counts_it() {
        let registry = ClientRegistry::new();
        let client = ClientId::from("conn_1");
        registry.on_connect(client.clone()).await;
        let _ = registry
            .install(&client, idle_handle(SessionState::Open))
            .await;

        registry.on_disconnect(&client).await;
        assert_eq!(registry.closed_session_count(), 1);
        assert!(registry.get(&client).await.is_none());

        // Idempotent: a second disconnect neither panics nor double-counts.
        registry.on_disconnect(&client).await;
        assert_eq!(registry.closed_session_count(), 1);
    }

    #[tokio::test]
    async fn live_session_count_only_counts_open() {
        let registry = ClientRegistry::new();
        let a = ClientId::from("conn_a");
        let b = ClientId::from("conn_b");
        let c = ClientId::from("conn_c");
        registry.on_connect(a.clone()).await;
        registry.on_connect(b.clone()).await;
        registry.on_connect(c.clone()).await;
        let _ = registry.install(&a, idle_handle(SessionState::Open)).await;
        let _ = registry.install(&b, idle_handle(SessionState::Failed)).await;

        assert_eq!(registry.connected_count().await, 3);
        assert_eq!(registry.live_session_count().await, 1);
    }
}
