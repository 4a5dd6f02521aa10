//! Correlation of asynchronous vendor callbacks to waiting callers.
//!
//! A caller registers a vendor-assigned job id and receives a
//! [`PendingHandle`] to await. When the vendor's webhook later lands with
//! that id, [`CorrelationStore::resolve`] fulfills the handle. Each entry
//! carries its own TTL timer task, cancelled on resolution, so exactly one
//! of {completed, failed, timed-out} ever wins — the `oneshot::Sender` is
//! removed from the map before use and consumed by the send.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chirp_core::ids::JobId;
use chirp_core::metrics::{CALLBACK_TIMEOUTS_TOTAL, STALE_CALLBACKS_TOTAL};

/// Terminal outcome of a pending callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The vendor delivered a transcript.
    Completed {
        /// Transcript text.
        text: String,
    },
    /// The vendor reported a failure.
    Failed {
        /// Vendor-supplied error description.
        message: String,
    },
    /// The TTL elapsed before any callback arrived.
    TimedOut,
}

/// The caller's side of a registered callback.
pub struct PendingHandle {
    rx: oneshot::Receiver<CallbackOutcome>,
}

impl PendingHandle {
    /// Wait for the callback or the TTL timer, whichever wins.
    pub async fn wait(self) -> CallbackOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            // Sender dropped without a send only happens when the store
            // itself is torn down mid-flight.
            Err(_) => CallbackOutcome::Failed {
                message: "correlation entry dropped before resolution".to_string(),
            },
        }
    }
}

struct PendingEntry {
    tx: oneshot::Sender<CallbackOutcome>,
    timer: CancellationToken,
}

/// Map of outstanding job ids to their single-use response handles.
#[derive(Default)]
pub struct CorrelationStore {
    entries: Mutex<HashMap<JobId, PendingEntry>>,
}

impl CorrelationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `job_id` and return the handle that will be fulfilled by
    /// [`resolve`](Self::resolve) or by the TTL timer, whichever fires
    /// first. Registering an id that is already pending supersedes the old
    /// entry; its waiter is failed rather than left hanging.
    pub fn register(self: &Arc<Self>, job_id: JobId, ttl: Duration) -> PendingHandle {
        let (tx, rx) = oneshot::channel();
        let timer = CancellationToken::new();

        let displaced = self.entries.lock().insert(
            job_id.clone(),
            PendingEntry {
                tx,
                timer: timer.clone(),
            },
        );
        if let Some(old) = displaced {
            warn!(%job_id, "job id re-registered while still pending");
            old.timer.cancel();
            let _ = old.tx.send(CallbackOutcome::Failed {
                message: "superseded by a newer registration".to_string(),
            });
        }

        let store = Arc::clone(self);
        drop(tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(ttl) => store.expire(&job_id),
            }
        }));

        PendingHandle { rx }
    }

    /// Fulfill the entry for `job_id` and remove it. Unknown or stale ids
    /// (already resolved, already timed out, never registered) are counted
    /// and ignored; returns whether a waiter was fulfilled.
    pub fn resolve(&self, job_id: &JobId, outcome: CallbackOutcome) -> bool {
        let Some(entry) = self.entries.lock().remove(job_id) else {
            warn!(%job_id, "unknown/stale callback");
            counter!(STALE_CALLBACKS_TOTAL).increment(1);
            return false;
        };
        entry.timer.cancel();
        debug!(%job_id, "callback resolved");
        // A dropped receiver means the caller gave up waiting; nothing to do.
        entry.tx.send(outcome).is_ok()
    }

    fn expire(&self, job_id: &JobId) {
        let Some(entry) = self.entries.lock().remove(job_id) else {
            return;
        };
        warn!(%job_id, "pending callback timed out");
        counter!(CALLBACK_TIMEOUTS_TOTAL).increment(1);
        let _ = entry.tx.send(CallbackOutcome::TimedOut);
    }

    /// Number of callbacks currently awaiting resolution.
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn resolve_fulfills_waiter_with_payload() {
        let store = CorrelationStore::new();
        let handle = store.register(JobId::from("job-42"), Duration::from_secs(5));

        let fulfilled = store.resolve(
            &JobId::from("job-42"),
            CallbackOutcome::Completed {
                text: "hello world".into(),
            },
        );
        assert!(fulfilled);
        assert_eq!(
            handle.wait().await,
            CallbackOutcome::Completed {
                text: "hello world".into()
            }
        );
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_resolve_is_a_safe_no_op() {
        let store = CorrelationStore::new();
        let handle = store.register(JobId::from("job-42"), Duration::from_secs(5));

        assert!(store.resolve(
            &JobId::from("job-42"),
            CallbackOutcome::Completed { text: "one".into() },
        ));
        assert!(!store.resolve(
            &JobId::from("job-42"),
            CallbackOutcome::Completed { text: "two".into() },
        ));
        // First resolution wins.
        assert_eq!(
            handle.wait().await,
            CallbackOutcome::Completed { text: "one".into() }
        );
    }

    #[tokio::test]
    async fn unknown_id_resolve_is_ignored() {
        let store = CorrelationStore::new();
        assert!(!store.resolve(&JobId::from("never-seen"), CallbackOutcome::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_fulfills_with_timeout() {
        let store = CorrelationStore::new();
        let handle = store.register(JobId::from("job-7"), Duration::from_millis(100));

        let started = Instant::now();
        assert_eq!(handle.wait().await, CallbackOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(store.pending_count(), 0);

        // Late callback after expiry is stale.
        assert!(!store.resolve(
            &JobId::from("job-7"),
            CallbackOutcome::Completed { text: "late".into() },
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_cancels_the_ttl_timer() {
        let store = CorrelationStore::new();
        let handle = store.register(JobId::from("job-9"), Duration::from_millis(50));

        assert!(store.resolve(
            &JobId::from("job-9"),
            CallbackOutcome::Failed {
                message: "vendor rejected the audio".into()
            },
        ));
        assert_eq!(
            handle.wait().await,
            CallbackOutcome::Failed {
                message: "vendor rejected the audio".into()
            }
        );

        // Let the would-be timer fire; the entry is gone so nothing happens.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn re_registering_fails_the_displaced_waiter() {
        let store = CorrelationStore::new();
        let first = store.register(JobId::from("job-1"), Duration::from_secs(5));
        let second = store.register(JobId::from("job-1"), Duration::from_secs(5));

        assert_eq!(
            first.wait().await,
            CallbackOutcome::Failed {
                message: "superseded by a newer registration".into()
            }
        );

        assert!(store.resolve(
            &JobId::from("job-1"),
            CallbackOutcome::Completed { text: "ok".into() },
        ));
        assert_eq!(
            second.wait().await,
            CallbackOutcome::Completed { text: "ok".into() }
        );
    }

    #[tokio::test]
    async fn pending_count_tracks_registrations() {
        let store = CorrelationStore::new();
        assert_eq!(store.pending_count(), 0);
        let _a = store.register(JobId::from("a"), Duration::from_secs(5));
        let _b = store.register(JobId::from("b"), Duration::from_secs(5));
        assert_eq!(store.pending_count(), 2);
        let _ = store.resolve(&JobId::from("a"), CallbackOutcome::TimedOut);
        assert_eq!(store.pending_count(), 1);
    }
}
