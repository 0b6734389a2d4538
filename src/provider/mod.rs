//! Provider adapters for external AI backends.
//!
//! Each capability is a trait; exactly one concrete backend is selected
//! per capability at configuration time. The chat/vision alternatives
//! (OpenAI, Gemini) are interchangeable deployments, never used together.

mod diarize;
mod gemini;
mod openai;
mod whisper;

pub use diarize::HttpDiarizer;
pub use gemini::GeminiChat;
pub use openai::OpenAiChat;
pub use whisper::WhisperTranscriber;

use crate::config::{ChatProvider, ProviderSettings};
use crate::error::{GranskaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A time-aligned transcript segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Result of a transcription call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Full transcript text.
    pub text: String,
    /// Audio duration in seconds.
    pub duration_seconds: f64,
    /// Detected language, if the provider reports one.
    pub language: Option<String>,
    /// Time-aligned segments.
    pub segments: Vec<TranscriptSegment>,
}

/// One speaker-attributed span of audio. Ordered by `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationSegment {
    pub speaker: u32,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Text and vision completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a system instruction plus user content, return the raw reply.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Describe an image submitted inline, return the raw reply.
    async fn describe_image(&self, image: &[u8], mime: &str, prompt: &str) -> Result<String>;
}

/// Speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe audio bytes into a time-aligned transcript.
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<Transcript>;
}

/// Speaker diarization backend.
#[async_trait]
pub trait Diarizer: Send + Sync {
    /// Segment the audio by speaker. An empty list is a valid outcome.
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizationSegment>>;
}

/// Build the configured chat/vision backend.
pub fn create_chat_model(settings: &ProviderSettings) -> Result<Arc<dyn ChatModel>> {
    match settings.chat {
        ChatProvider::OpenAi => Ok(Arc::new(OpenAiChat::new(settings)?)),
        ChatProvider::Gemini => Ok(Arc::new(GeminiChat::new(settings)?)),
    }
}

/// Whether a provider error message indicates an exhausted quota or rate
/// limit, which the orchestrator recovers from locally.
pub(crate) fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota")
        || lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("resource_exhausted")
}

/// Classify a provider failure message into the error taxonomy.
pub(crate) fn classify_provider_error(message: String) -> GranskaError {
    if is_quota_message(&message) {
        GranskaError::QuotaExceeded(message)
    } else {
        GranskaError::ProviderError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_messages_are_detected() {
        assert!(is_quota_message("You exceeded your current quota"));
        assert!(is_quota_message("HTTP 429 Too Many Requests"));
        assert!(is_quota_message("RESOURCE_EXHAUSTED"));
        assert!(!is_quota_message("model not found"));
    }

    #[test]
    fn classification_splits_quota_from_provider_errors() {
        assert!(matches!(
            classify_provider_error("quota exceeded".to_string()),
            GranskaError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_provider_error("bad gateway".to_string()),
            GranskaError::ProviderError(_)
        ));
    }
}
