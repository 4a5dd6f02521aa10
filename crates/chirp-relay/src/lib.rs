//! # chirp-relay
//!
//! The conversational core of the gateway: per-client upstream relay
//! sessions, the degraded-mode fallback pipeline, and correlation of
//! asynchronous vendor callbacks back to their waiting callers.
//!
//! Layout:
//! - [`registry`] — one entry per connected browser client, at most one
//!   upstream session each.
//! - [`upstream`] — the actor that owns an outbound vendor WebSocket.
//! - [`router`] — maps inbound browser frames onto the live relay or the
//!   fallback pipeline.
//! - [`fallback`] — transcribe → respond → synthesize, with partial results.
//! - [`correlation`] — pending webhook callbacks with TTL timers.
//! - [`gateway`] — async transcription job submission + correlated await.

#![deny(unsafe_code)]

pub mod correlation;
pub mod fallback;
pub mod gateway;
pub mod registry;
pub mod router;
pub mod upstream;

pub use correlation::{CallbackOutcome, CorrelationStore, PendingHandle};
pub use fallback::{ConversationTurn, FallbackPipeline, PipelineOutcome, Stage, StageError};
pub use gateway::TranscriptionGateway;
pub use registry::{ClientRegistry, InstallOutcome};
pub use router::RelayRouter;
pub use upstream::{
    SessionEvent, SessionState, TungsteniteConnector, UpstreamConnector, UpstreamError,
    UpstreamHandle, UpstreamSession,
};
