//! # chirp-vendors
//!
//! HTTP clients for the gateway's external collaborators, consumed as black
//! boxes: a text-generation service, a speech-synthesis service, and an
//! asynchronous transcription-job service whose results arrive later via
//! webhook.
//!
//! Every client checks its credentials up front and fails with
//! [`VendorError::NotConfigured`] for that specific capability rather than a
//! generic failure.

#![deny(unsafe_code)]

pub mod chat;
pub mod error;
pub mod speech;
pub mod transcription;

pub use chat::ChatClient;
pub use error::{VendorError, VendorResult};
pub use speech::SpeechClient;
pub use transcription::TranscriptionClient;

/// Hard ceiling on any single vendor HTTP call. Stage-level budgets are
/// usually tighter; this bounds calls made outside a staged pipeline.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Shared default HTTP client with the request timeout applied.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}
