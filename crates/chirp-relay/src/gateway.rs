//! Asynchronous transcription with callback correlation.
//!
//! Submits the audio as a vendor job carrying our webhook URL, registers
//! the vendor-assigned job id with the [`CorrelationStore`], and awaits the
//! handle. The caller's HTTP response stays pending until the webhook lands
//! or the TTL expires.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use chirp_vendors::{TranscriptionClient, VendorResult};

use crate::correlation::{CallbackOutcome, CorrelationStore};

/// Bridges the async job API and the webhook receiver.
pub struct TranscriptionGateway {
    client: TranscriptionClient,
    store: Arc<CorrelationStore>,
    callback_url: String,
    job_ttl: Duration,
}

impl TranscriptionGateway {
    /// Build a gateway. `callback_url` must be reachable by the vendor.
    #[must_use]
    pub fn new(
        client: TranscriptionClient,
        store: Arc<CorrelationStore>,
        callback_url: String,
        job_ttl: Duration,
    ) -> Self {
        Self {
            client,
            store,
            callback_url,
            job_ttl,
        }
    }

    /// The store webhook handlers resolve into.
    #[must_use]
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Submit `audio` for transcription and wait for the result.
    ///
    /// Errors only when the submission itself fails; once the job is
    /// accepted the return value is always one of the three callback
    /// outcomes (completed, failed, timed out).
    #[instrument(skip_all, fields(audio_bytes = audio.len()))]
    pub async fn transcribe(&self, audio: &[u8], mime_type: &str) -> VendorResult<CallbackOutcome> {
        let job_id = self
            .client
            .submit_job(audio, mime_type, &self.callback_url)
            .await?;
        debug!(%job_id, ttl = ?self.job_ttl, "awaiting transcription callback");
        let handle = self.store.register(job_id, self.job_ttl);
        Ok(handle.wait().await)
    }
}
