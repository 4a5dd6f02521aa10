//! Persona configuration for the learning companion.
//!
//! The same persona is used on both paths: the upstream session's
//! initialization frame and the fallback pipeline's system prompt.

/// Voice identifier sent in the upstream initialization frame.
pub const VOICE_ID: &str = "nova-child-friendly";

/// Display name the companion uses for itself.
pub const COMPANION_NAME: &str = "Pip";

/// System prompt for the text-generation stage of the fallback pipeline.
pub const SYSTEM_PROMPT: &str = "You are Pip, a cheerful learning companion for children aged 5-10. \
Answer in simple, encouraging language. Keep answers short and conversational, \
like speech rather than writing. Never discuss frightening or inappropriate topics; \
gently redirect to something fun to learn instead.";

/// Build the upstream session initialization payload.
///
/// The vendor requires this frame before it will accept audio.
pub fn init_frame() -> serde_json::Value {
    serde_json::json!({
        "type": "session.init",
        "persona": {
            "name": COMPANION_NAME,
            "instructions": SYSTEM_PROMPT,
        },
        "voice": VOICE_ID,
    })
}
