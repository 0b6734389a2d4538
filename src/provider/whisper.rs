//! OpenAI Whisper transcription backend.

use super::{Transcriber, Transcript, TranscriptSegment};
use crate::config::ProviderSettings;
use crate::error::{GranskaError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Whisper-based transcriber.
pub struct WhisperTranscriber {
    client: Client<OpenAIConfig>,
    model: String,
}

impl WhisperTranscriber {
    /// Create a transcriber from provider settings.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client =
            super::openai::create_client(Duration::from_secs(settings.request_timeout_seconds))?;

        Ok(Self {
            client,
            model: settings.transcription_model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip_all, fields(filename = %filename, bytes = audio.len()))]
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<Transcript> {
        debug!("Transcribing audio with {}", self.model);

        let request = CreateTranscriptionRequestArgs::default()
            .file(async_openai::types::AudioInput::from_vec_u8(
                filename.to_string(),
                audio.to_vec(),
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .build()
            .map_err(|e| GranskaError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| GranskaError::Transcription(format!("Whisper API error: {}", e)))?;

        // Parse segments from verbose JSON response
        let segments: Vec<TranscriptSegment> = response
            .segments
            .map(|segs| {
                segs.iter()
                    .map(|s| TranscriptSegment {
                        start: s.start as f64,
                        end: s.end as f64,
                        text: s.text.trim().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_else(|| {
                // Fallback: single segment spanning the whole recording
                vec![TranscriptSegment {
                    start: 0.0,
                    end: response.duration as f64,
                    text: response.text.trim().to_string(),
                }]
            });

        debug!("Transcribed {} segments", segments.len());

        Ok(Transcript {
            text: response.text.trim().to_string(),
            duration_seconds: response.duration as f64,
            language: Some(response.language).filter(|l| !l.is_empty()),
            segments,
        })
    }
}
