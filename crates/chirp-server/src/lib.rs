//! # chirp-server
//!
//! The gateway's HTTP + WebSocket surface: `/ws` for browser clients,
//! `/api/transcribe` for pending-response transcription, the vendor webhook
//! receiver at `/callbacks/transcription`, plus `/health` and `/metrics`.

#![deny(unsafe_code)]

pub mod callbacks;
pub mod connection;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use server::{AppState, GatewayServer};
pub use shutdown::ShutdownCoordinator;
