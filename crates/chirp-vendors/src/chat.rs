//! Text-generation vendor client.
//!
//! Prompt in, text out, with a token budget parameter. The budget is chosen
//! by [`reply_budget`] so voice replies stay conversationally sized instead
//! of verbose.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use chirp_settings::types::ChatVendor;

use crate::error::{VendorError, VendorResult};

/// Smallest reply budget, for one-word questions.
const MIN_REPLY_TOKENS: u32 = 60;
/// Budget ceiling; spoken replies longer than this lose a child's attention.
const MAX_REPLY_TOKENS: u32 = 300;
/// Tokens granted per character of input past the base.
const TOKENS_PER_INPUT_CHAR: u32 = 2;

/// Pick a response length budget from the input length.
///
/// Short input gets a short budget; longer input grows the budget
/// proportionally up to the cap.
pub fn reply_budget(input: &str) -> u32 {
    let grown = MIN_REPLY_TOKENS.saturating_add(
        TOKENS_PER_INPUT_CHAR.saturating_mul(input.trim().len() as u32),
    );
    grown.min(MAX_REPLY_TOKENS)
}

/// Client for the text-generation vendor.
pub struct ChatClient {
    config: ChatVendor,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client.
    #[must_use]
    pub fn new(config: ChatVendor) -> Self {
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
                capability: "text generation",
            })?;
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = format!("Bearer {api_key}");
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| VendorError::InvalidInput {
                message: "chat API key contains invalid header characters".into(),
            })?,
        );
        Ok(headers)
    }

    /// Generate a reply to `prompt` under `system` instructions.
    ///
    /// `max_tokens` is the response length budget (see [`reply_budget`]).
    #[instrument(skip_all, fields(prompt_len = prompt.len(), max_tokens))]
    pub async fn respond(
        &self,
        prompt: &str,
        system: &str,
        max_tokens: u32,
    ) -> VendorResult<String> {
        let headers = self.build_headers()?;
        let body = json!({
            "model": self.config.model,
            "system": system,
            "prompt": prompt,
            "max_tokens": max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/generate", self.config.base_url))
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
        let text = parsed
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| VendorError::Malformed {
                message: "chat response missing `text`".into(),
            })?;
        debug!(reply_len = text.len(), "chat vendor replied");
        Ok(text.to_owned())
    }
}
