//! OpenAI chat and vision backend.

use super::{classify_provider_error, ChatModel};
use crate::config::ProviderSettings;
use crate::error::{GranskaError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, ImageUrlArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use tracing::{debug, instrument};

/// Create an OpenAI client with a bounded request timeout so a slow
/// provider cannot stall a task indefinitely.
pub(crate) fn create_client(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GranskaError::Config(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}

/// OpenAI-backed chat/vision model.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    chat_model: String,
    vision_model: String,
    max_tokens: u32,
}

impl OpenAiChat {
    /// Create a backend from provider settings. The API key comes from
    /// the `OPENAI_API_KEY` environment variable.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = create_client(Duration::from_secs(settings.request_timeout_seconds))?;

        Ok(Self {
            client,
            chat_model: settings.chat_model.clone(),
            vision_model: settings.vision_model.clone(),
            max_tokens: settings.max_summary_tokens,
        })
    }

    async fn send(&self, request: CreateChatCompletionRequest) -> Result<String> {
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| classify_provider_error(format!("OpenAI API error: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| GranskaError::ProviderError("No content in OpenAI reply".to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    #[instrument(skip_all, fields(model = %self.chat_model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        debug!("Requesting chat completion");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .max_tokens(self.max_tokens)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| GranskaError::ProviderError(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()
                    .map_err(|e| GranskaError::ProviderError(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| GranskaError::ProviderError(e.to_string()))?;

        self.send(request).await
    }

    #[instrument(skip_all, fields(model = %self.vision_model, bytes = image.len()))]
    async fn describe_image(&self, image: &[u8], mime: &str, prompt: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_uri = format!("data:{};base64,{}", mime, encoded);

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(prompt)
            .build()
            .map_err(|e| GranskaError::ProviderError(e.to_string()))?;

        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(data_uri)
                    .build()
                    .map_err(|e| GranskaError::ProviderError(e.to_string()))?,
            )
            .build()
            .map_err(|e| GranskaError::ProviderError(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.vision_model)
            .max_tokens(self.max_tokens)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(vec![text_part.into(), image_part.into()])
                .build()
                .map_err(|e| GranskaError::ProviderError(e.to_string()))?
                .into()])
            .build()
            .map_err(|e| GranskaError::ProviderError(e.to_string()))?;

        self.send(request).await
    }
}
