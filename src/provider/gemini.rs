//! Google Gemini chat and vision backend.
//!
//! Alternative deployment to the OpenAI backend; selected via the
//! `providers.chat` setting and never used alongside it.

use super::{classify_provider_error, ChatModel};
use crate::config::ProviderSettings;
use crate::error::{GranskaError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini-backed chat/vision model.
pub struct GeminiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiChat {
    /// Create a backend from provider settings. The API key comes from
    /// the `GEMINI_API_KEY` environment variable.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GranskaError::Config("GEMINI_API_KEY environment variable not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|e| GranskaError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: settings.chat_model.clone(),
        })
    }

    async fn generate(&self, parts: Vec<Value>) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE_URL, self.model, self.api_key
        );

        let body = json!({ "contents": [{ "parts": parts }] });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GranskaError::ProviderError(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_provider_error(format!(
                "Gemini API error ({}): {}",
                status, text
            )));
        }

        let json_resp: Value = response
            .json()
            .await
            .map_err(|e| GranskaError::ProviderError(format!("Invalid Gemini reply: {}", e)))?;

        json_resp["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| GranskaError::ProviderError("No content in Gemini reply".to_string()))
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        debug!("Requesting Gemini completion");

        // Gemini v1beta has no system role; prepend the instruction
        let combined = format!("{}\n\n{}", system, user);
        self.generate(vec![json!({ "text": combined })]).await
    }

    #[instrument(skip_all, fields(model = %self.model, bytes = image.len()))]
    async fn describe_image(&self, image: &[u8], mime: &str, prompt: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);

        self.generate(vec![
            json!({ "text": prompt }),
            json!({ "inline_data": { "mime_type": mime, "data": encoded } }),
        ])
        .await
    }
}
