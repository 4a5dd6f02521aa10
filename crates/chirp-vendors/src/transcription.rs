//! Transcription vendor client.
//!
//! Two call shapes against the same vendor:
//! - [`TranscriptionClient::transcribe`] — synchronous endpoint used by the
//!   fallback pipeline (audio in, text out).
//! - [`TranscriptionClient::submit_job`] — asynchronous job endpoint used by
//!   the HTTP transcription route: submits audio plus a callback URL and
//!   returns the vendor-assigned job id immediately; the result arrives
//!   later as a webhook POST.

use base64::Engine;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use chirp_core::ids::JobId;
use chirp_settings::types::TranscriptionVendor;

use crate::error::{VendorError, VendorResult};

/// Maximum audio size in bytes (50 MB).
pub const MAX_AUDIO_SIZE: usize = 50 * 1024 * 1024;

/// Map a MIME type to a sensible default filename with the correct extension.
///
/// Many audio services use the file extension to determine the container
/// format; sending m4a audio with a `.wav` extension causes decode errors.
fn filename_for_mime(mime_type: &str) -> String {
    let ext = match mime_type {
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => "m4a",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" | "audio/vorbis" => "ogg",
        "audio/webm" => "webm",
        "audio/flac" | "audio/x-flac" => "flac",
        _ => "wav",
    };
    format!("audio.{ext}")
}

/// Strip a data URI prefix from base64-encoded audio.
///
/// Browsers send `data:audio/webm;base64,AAAA...` — this extracts the raw
/// base64 portion after the `;base64,` marker. Plain base64 passes through.
pub fn normalize_base64(input: &str) -> &str {
    match input.find(";base64,") {
        Some(idx) => &input[idx + 8..],
        None => input,
    }
}

/// Client for the transcription vendor.
pub struct TranscriptionClient {
    config: TranscriptionVendor,
    client: reqwest::Client,
}

impl TranscriptionClient {
    /// Create a new transcription client.
    #[must_use]
    pub fn new(config: TranscriptionVendor) -> Self {
        Self {
            config,
            client: crate::http_client(),
        }
    }

    fn build_headers(&self) -> VendorResult<HeaderMap> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(VendorError::NotConfigured {
                capability: "transcription",
            })?;
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {api_key}");
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| VendorError::InvalidInput {
                message: "transcription API key contains invalid header characters".into(),
            })?,
        );
        Ok(headers)
    }

    fn check_size(audio: &[u8]) -> VendorResult<()> {
        if audio.len() > MAX_AUDIO_SIZE {
            return Err(VendorError::InvalidInput {
                message: format!(
                    "audio data too large: {} bytes (max {MAX_AUDIO_SIZE})",
                    audio.len()
                ),
            });
        }
        Ok(())
    }

    /// Transcribe audio synchronously. Returns the transcript text, which
    /// may be empty when the vendor detected no speech.
    #[instrument(skip_all, fields(audio_bytes = audio.len(), mime_type))]
    pub async fn transcribe(&self, audio: &[u8], mime_type: &str) -> VendorResult<String> {
        let headers = self.build_headers()?;
        Self::check_size(audio)?;

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(filename_for_mime(mime_type))
            .mime_str(mime_type)
            .map_err(|e| VendorError::InvalidInput {
                message: format!("invalid MIME type: {e}"),
            })?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response = self
            .client
            .post(format!("{}/transcribe", self.config.base_url))
            .headers(headers)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(VendorError::Api { status, message });
        }

        let parsed: Value = response.json().await?;
        let text = parsed
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| VendorError::Malformed {
                message: "transcription response missing `text`".into(),
            })?;
        debug!(transcript_len = text.len(), "sync transcription complete");
        Ok(text.to_owned())
    }

    /// Submit an asynchronous transcription job.
    ///
    /// The vendor replies immediately with a job id; the transcript arrives
    /// later as a POST to `callback_url` carrying the same id.
    #[instrument(skip_all, fields(audio_bytes = audio.len(), callback_url))]
    pub async fn submit_job(
        &self,
        audio: &[u8],
        mime_type: &str,
        callback_url: &str,
    ) -> VendorResult<JobId> {
        let headers = self.build_headers()?;
        Self::check_size(audio)?;

        let body = json!({
            "audio_b64": base64::engine::general_purpose::STANDARD.encode(audio),
            "mime_type": mime_type,
            "callback_url": callback_url,
        });

        let response = self
            .client
            .post(format!("{}/jobs", self.config.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(VendorError::Api { status, message });
        }

        let parsed: Value = response.json().await?;
        let id = parsed
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| VendorError::Malformed {
                message: "job response missing `id`".into(),
            })?;
        debug!(job_id = id, "transcription job submitted");
        Ok(JobId::from(id))
    }
}
