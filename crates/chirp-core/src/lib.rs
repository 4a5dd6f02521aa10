//! # chirp-core
//!
//! Shared protocol types for the chirp gateway:
//! - Browser-facing WebSocket frame types (typed JSON, `type`-tagged)
//! - Branded ID helpers (UUID v7, time-ordered)
//! - Persona constants for the kids' learning companion

#![deny(unsafe_code)]

pub mod frames;
pub mod ids;
pub mod metrics;
pub mod persona;

pub use frames::{ClientFrame, ServerFrame};
pub use ids::{ClientId, JobId};
