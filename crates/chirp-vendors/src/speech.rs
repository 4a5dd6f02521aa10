//! Speech-synthesis vendor client: text in, audio bytes out.

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::json;
use tracing::{debug, instrument};

use chirp_settings::types::SpeechVendor;

use crate::error::{VendorError, VendorResult};

/// Client for the speech-synthesis vendor.
pub struct SpeechClient {
    config: SpeechVendor,
    client: reqwest::Client,
}

impl SpeechClient {
    /// Create a new speech client.
    #[must_use]
    pub fn new(config: SpeechVendor) -> Self {
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
                capability: "speech synthesis",
            })?;
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = format!("Bearer {api_key}");
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| VendorError::InvalidInput {
                message: "speech API key contains invalid header characters".into(),
            })?,
        );
        Ok(headers)
    }

    /// Synthesize `text` into audio bytes with the configured voice.
    #[instrument(skip_all, fields(text_len = text.len(), voice = %self.config.voice))]
    pub async fn synthesize(&self, text: &str) -> VendorResult<Bytes> {
        if text.trim().is_empty() {
            return Err(VendorError::InvalidInput {
                message: "nothing to synthesize".into(),
            });
        }

        let headers = self.build_headers()?;
        let body = json!({
            "voice": self.config.voice,
            "text": text,
        });

        let response = self
            .client
            .post(format!("{}/synthesize", self.config.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(VendorError::Api { status, message });
        }

        let audio = response.bytes().await?;
        debug!(audio_bytes = audio.len(), "speech vendor synthesized");
        Ok(audio)
    }
}
