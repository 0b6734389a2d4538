//! HTTP client for the speaker diarization sidecar service.

use super::{Diarizer, DiarizationSegment};
use crate::config::DiarizationSettings;
use crate::error::{GranskaError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// Diarizer backed by a separate HTTP service that accepts an uploaded
/// audio file and returns speaker segments.
pub struct HttpDiarizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDiarizer {
    /// Create a client from diarization settings.
    pub fn new(settings: &DiarizationSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| GranskaError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Diarizer for HttpDiarizer {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizationSegment>> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| GranskaError::Diarization(format!("Cannot read audio file: {}", e)))?;

        let filename = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));

        let response = self
            .client
            .post(format!("{}/diarize", self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(|e| GranskaError::Diarization(format!("Diarization request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GranskaError::Diarization(format!(
                "Diarization service returned {}",
                response.status()
            )));
        }

        let mut segments: Vec<DiarizationSegment> = response
            .json()
            .await
            .map_err(|e| GranskaError::Diarization(format!("Invalid diarization reply: {}", e)))?;

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        debug!("Diarized {} segments", segments.len());

        Ok(segments)
    }
}
