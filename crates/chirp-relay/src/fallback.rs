//! Degraded-mode conversation pipeline.
//!
//! Three strictly ordered stages, each independently failable under its own
//! timeout: transcribe the audio, generate a reply, synthesize speech.
//! Partial success beats total failure: a stage failure stops the chain but
//! the results of earlier stages are still delivered. Silent audio
//! short-circuits after stage one with no downstream vendor calls.

use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, instrument, warn};

use chirp_core::metrics::FALLBACK_INVOCATIONS_TOTAL;
use chirp_core::persona;
use chirp_vendors::chat::reply_budget;
use chirp_vendors::{ChatClient, SpeechClient, TranscriptionClient, VendorError, VendorResult};

/// Transcript value some vendors return for audio with no detected speech.
const NO_SPEECH_SENTINEL: &str = "[no speech]";

/// Which pipeline stage an error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Speech-to-text.
    Transcribe,
    /// Text generation.
    Respond,
    /// Text-to-speech.
    Synthesize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Transcribe => "transcribe",
            Self::Respond => "respond",
            Self::Synthesize => "synthesize",
        })
    }
}

/// A stage-local failure. Later stages are not attempted.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage exceeded its time budget.
    #[error("{stage} stage timed out after {timeout:?}")]
    Timeout {
        /// Which stage.
        stage: Stage,
        /// The configured budget.
        timeout: Duration,
    },
    /// The vendor call failed.
    #[error("{stage} stage failed: {source}")]
    Vendor {
        /// Which stage.
        stage: Stage,
        /// Underlying vendor error.
        source: VendorError,
    },
}

impl StageError {
    /// Which stage failed.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Timeout { stage, .. } | Self::Vendor { stage, .. } => *stage,
        }
    }

    /// A message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.stage() {
            Stage::Transcribe => "I couldn't understand the audio. Try again?".to_string(),
            Stage::Respond => "I heard you, but I couldn't think of an answer right now.".to_string(),
            Stage::Synthesize => "I lost my voice for a moment, so here is my answer as text.".to_string(),
        }
    }
}

/// Everything one fallback invocation produced. Fields past the first
/// failed stage stay `None`.
#[derive(Debug, Default)]
pub struct ConversationTurn {
    /// What the platform heard (voice path only).
    pub transcript: Option<String>,
    /// The generated reply text.
    pub reply: Option<String>,
    /// Synthesized reply audio.
    pub audio: Option<Bytes>,
    /// The failure that stopped the chain, if any.
    pub failure: Option<StageError>,
}

/// Result of a voice invocation.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Nothing intelligible in the audio; no downstream calls were made.
    NoSpeech,
    /// A turn, possibly partial.
    Turn(ConversationTurn),
}

/// The transcribe → respond → synthesize chain.
pub struct FallbackPipeline {
    transcription: TranscriptionClient,
    chat: ChatClient,
    speech: SpeechClient,
    stage_timeout: Duration,
}

impl FallbackPipeline {
    /// Assemble the pipeline from its vendor clients.
    #[must_use]
    pub fn new(
        transcription: TranscriptionClient,
        chat: ChatClient,
        speech: SpeechClient,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            transcription,
            chat,
            speech,
            stage_timeout,
        }
    }

    /// Run a full voice turn: audio in, transcript + reply + audio out.
    #[instrument(skip_all, fields(audio_bytes = audio.len()))]
    pub async fn voice_turn(&self, audio: &[u8], mime_type: &str) -> PipelineOutcome {
        counter!(FALLBACK_INVOCATIONS_TOTAL, "kind" => "voice").increment(1);

        if audio.is_empty() {
            debug!("empty audio, skipping all stages");
            return PipelineOutcome::NoSpeech;
        }

        let transcript = match self
            .run_stage(Stage::Transcribe, self.transcription.transcribe(audio, mime_type))
            .await
        {
            Ok(text) => text,
            Err(failure) => {
                return PipelineOutcome::Turn(ConversationTurn {
                    failure: Some(failure),
                    ..ConversationTurn::default()
                });
            }
        };

        if is_silence(&transcript) {
            debug!("no speech detected, skipping respond and synthesize");
            return PipelineOutcome::NoSpeech;
        }

        let mut turn = self.respond_and_synthesize(&transcript).await;
        turn.transcript = Some(transcript);
        PipelineOutcome::Turn(turn)
    }

    /// Run a text turn: respond + synthesize, no transcription.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub async fn text_turn(&self, text: &str) -> ConversationTurn {
        counter!(FALLBACK_INVOCATIONS_TOTAL, "kind" => "text").increment(1);
        self.respond_and_synthesize(text).await
    }

    async fn respond_and_synthesize(&self, input: &str) -> ConversationTurn {
        let budget = reply_budget(input);
        let reply = match self
            .run_stage(
                Stage::Respond,
                self.chat.respond(input, persona::SYSTEM_PROMPT, budget),
            )
            .await
        {
            Ok(reply) => reply,
            Err(failure) => {
                return ConversationTurn {
                    failure: Some(failure),
                    ..ConversationTurn::default()
                };
            }
        };

        let (audio, failure) = match self
            .run_stage(Stage::Synthesize, self.speech.synthesize(&reply))
            .await
        {
            Ok(audio) => (Some(audio), None),
            Err(failure) => (None, Some(failure)),
        };

        ConversationTurn {
            transcript: None,
            reply: Some(reply),
            audio,
            failure,
        }
    }

    async fn run_stage<T>(
        &self,
        stage: Stage,
        call: impl Future<Output = VendorResult<T>>,
    ) -> Result<T, StageError> {
        match tokio::time::timeout(self.stage_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => {
                warn!(%stage, error = %source, category = source.category(), "stage failed");
                Err(StageError::Vendor { stage, source })
            }
            Err(_) => {
                warn!(%stage, timeout = ?self.stage_timeout, "stage timed out");
                Err(StageError::Timeout {
                    stage,
                    timeout: self.stage_timeout,
                })
            }
        }
    }
}

fn is_silence(transcript: &str) -> bool {
    let trimmed = transcript.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_SPEECH_SENTINEL)
}
