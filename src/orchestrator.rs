//! Task orchestrator for Granska.
//!
//! The single owner of the task lifecycle: every submit call creates
//! exactly one task row, drives extraction, provider calls, and
//! normalization, and records exactly one terminal transition. A failure
//! after the row exists still yields a queryable Failed record before the
//! error is re-raised to the caller.

use crate::auth::RequestContext;
use crate::config::Settings;
use crate::error::{GranskaError, Result};
use crate::extract::{extract_document, word_count, PageFetcher, UrlExtractor};
use crate::normalize::{normalize, Analysis, ResponseShape};
use crate::provider::{
    create_chat_model, ChatModel, DiarizationSegment, Diarizer, HttpDiarizer, Transcriber,
    WhisperTranscriber,
};
use crate::storage::UploadStore;
use crate::task::{Task, TaskFilter, TaskKind, TaskStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const CONVERSATION_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes \
    conversations. Provide a concise summary of the key points discussed.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes content. You \
    must respond with ONLY valid JSON. No other text, no markdown formatting, no explanations. \
    The JSON must have this exact structure: {\"summary\": \"detailed summary text here\", \
    \"keyPoints\": [\"key point 1\", \"key point 2\"], \"topics\": [\"topic 1\", \"topic 2\"]}. \
    Ensure the JSON is properly formatted with double quotes around all keys and string values.";

const IMAGE_PROMPT: &str = "Please analyze this image and provide: 1. A detailed description, \
    2. List of objects detected, 3. Dominant colors, 4. Relevant tags. Format the response as \
    JSON with keys: description, objects, colors, tags.";

/// Result of a conversation analysis submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub transcription: String,
    pub diarization: Vec<DiarizationSegment>,
    pub summary: String,
    pub metadata: Map<String, Value>,
}

/// Result of an image analysis submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysisResult {
    pub description: String,
    pub objects: Vec<String>,
    pub colors: Vec<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Result of a document summarization submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub summary: String,
    #[serde(rename = "keyPoints")]
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Result of a URL summarization submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlSummary {
    #[serde(rename = "originalUrl")]
    pub original_url: String,
    pub summary: String,
    #[serde(rename = "keyPoints")]
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// The main orchestrator for analysis tasks.
pub struct Orchestrator {
    store: Arc<TaskStore>,
    chat: Arc<dyn ChatModel>,
    transcriber: Arc<dyn Transcriber>,
    diarizer: Arc<dyn Diarizer>,
    uploads: UploadStore,
    pages: Arc<dyn PageFetcher>,
    settings: Settings,
}

impl Orchestrator {
    /// Create an orchestrator with the configured backends.
    pub fn new(settings: Settings) -> Result<Self> {
        let store = Arc::new(TaskStore::new(&settings.sqlite_path())?);
        let chat = create_chat_model(&settings.providers)?;
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(WhisperTranscriber::new(&settings.providers)?);
        let diarizer: Arc<dyn Diarizer> = Arc::new(HttpDiarizer::new(&settings.diarization)?);
        let pages: Arc<dyn PageFetcher> = Arc::new(UrlExtractor::new(&settings.fetch)?);

        Self::with_components(settings, store, chat, transcriber, diarizer, pages)
    }

    /// Create an orchestrator with injected components (test doubles).
    pub fn with_components(
        settings: Settings,
        store: Arc<TaskStore>,
        chat: Arc<dyn ChatModel>,
        transcriber: Arc<dyn Transcriber>,
        diarizer: Arc<dyn Diarizer>,
        pages: Arc<dyn PageFetcher>,
    ) -> Result<Self> {
        let uploads = UploadStore::new(settings.uploads_dir())?;

        Ok(Self {
            store,
            chat,
            transcriber,
            diarizer,
            uploads,
            pages,
            settings,
        })
    }

    /// Get a handle to the task store.
    pub fn store(&self) -> Arc<TaskStore> {
        self.store.clone()
    }

    /// List the caller's tasks, newest first.
    pub fn list_tasks(
        &self,
        ctx: &RequestContext,
        filter: &TaskFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Task>, usize)> {
        let principal = ctx.require_principal()?;
        self.store.list(&principal.id, filter, limit, offset)
    }

    /// Transcribe, diarize, and summarize an uploaded conversation.
    #[instrument(skip(self, audio, ctx), fields(filename = %filename))]
    pub async fn submit_conversation_analysis(
        &self,
        audio: Vec<u8>,
        filename: &str,
        ctx: &RequestContext,
    ) -> Result<ConversationAnalysis> {
        let principal = ctx.require_principal()?;
        if audio.is_empty() {
            return Err(GranskaError::InvalidInput("No audio file provided".to_string()));
        }

        let mut metadata = Map::new();
        metadata.insert("fileSize".to_string(), json!(audio.len()));
        metadata.insert("fileType".to_string(), json!(mime_for_filename(filename)));

        let task = Task::new(&principal.id, TaskKind::ConversationAnalysis, filename, metadata);
        self.store.insert(&task)?;

        match self.run_conversation(&task, audio, filename).await {
            Ok(result) => Ok(result),
            Err(err) => self.record_failure(task.id, err),
        }
    }

    async fn run_conversation(
        &self,
        task: &Task,
        audio: Vec<u8>,
        filename: &str,
    ) -> Result<ConversationAnalysis> {
        let stored_path = self.uploads.persist(filename, &audio).await?;
        self.store
            .update_input(task.id, &stored_path.to_string_lossy())?;

        // Transcription and diarization run on the same immutable bytes;
        // a diarization failure must not fail or cancel the transcription
        let (transcript, diarization) = tokio::join!(
            self.transcriber.transcribe(&audio, filename),
            self.diarize_leniently(&stored_path),
        );
        let transcript = transcript?;

        let summary = self
            .summarize_with_fallback(
                CONVERSATION_SYSTEM_PROMPT,
                &format!("Please summarize this conversation:\n\n{}", transcript.text),
                word_count(&transcript.text),
                None,
            )
            .await?;

        let speakers = diarization
            .iter()
            .map(|d| d.speaker + 1)
            .max()
            .unwrap_or(1);

        let mut metadata = Map::new();
        metadata.insert("duration".to_string(), json!(transcript.duration_seconds));
        metadata.insert("language".to_string(), json!(transcript.language));
        metadata.insert("segments".to_string(), json!(transcript.segments.len()));
        metadata.insert("speakers".to_string(), json!(speakers));

        let result = ConversationAnalysis {
            transcription: transcript.text,
            diarization,
            summary,
            metadata: metadata.clone(),
        };

        self.finalize(task.id, &serde_json::to_string(&result)?, metadata)?;
        Ok(result)
    }

    /// Describe an uploaded image with the vision backend.
    #[instrument(skip(self, image, ctx), fields(filename = %filename, mime = %mime))]
    pub async fn submit_image_analysis(
        &self,
        image: Vec<u8>,
        mime: &str,
        filename: &str,
        ctx: &RequestContext,
    ) -> Result<ImageAnalysisResult> {
        let principal = ctx.require_principal()?;
        if image.is_empty() {
            return Err(GranskaError::InvalidInput("No image file provided".to_string()));
        }

        let mut metadata = Map::new();
        metadata.insert("fileSize".to_string(), json!(image.len()));
        metadata.insert("fileType".to_string(), json!(mime));

        let task = Task::new(&principal.id, TaskKind::ImageAnalysis, filename, metadata);
        self.store.insert(&task)?;

        match self.run_image(&task, image, mime, filename).await {
            Ok(result) => Ok(result),
            Err(err) => self.record_failure(task.id, err),
        }
    }

    async fn run_image(
        &self,
        task: &Task,
        image: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<ImageAnalysisResult> {
        let stored_path = self.uploads.persist(filename, &image).await?;
        self.store
            .update_input(task.id, &stored_path.to_string_lossy())?;

        let raw = match self.chat.describe_image(&image, mime, IMAGE_PROMPT).await {
            Ok(reply) => reply,
            Err(GranskaError::QuotaExceeded(msg)) => {
                warn!("Vision quota exceeded, using local fallback: {}", msg);
                quota_fallback_reply(ResponseShape::ImageDescription, 0)
            }
            Err(err) => return Err(err),
        };

        let normalized = normalize(&raw, ResponseShape::ImageDescription);
        let fields = match normalized.analysis {
            Analysis::Image(fields) => fields,
            Analysis::Summary(_) => unreachable!("image shape requested"),
        };

        let mut metadata = Map::new();
        if normalized.degraded {
            warn!("Vision reply was not structured; stored as passthrough");
            metadata.insert("normalizationDegraded".to_string(), json!(true));
        }

        let result = ImageAnalysisResult {
            description: fields.description,
            objects: fields.objects,
            colors: fields.colors,
            tags: fields.tags,
            metadata: metadata.clone(),
        };

        self.finalize(task.id, &serde_json::to_string(&result)?, metadata)?;
        Ok(result)
    }

    /// Extract and summarize an uploaded document (PDF, DOCX).
    #[instrument(skip(self, file, ctx), fields(filename = %filename, mime = %mime))]
    pub async fn submit_document_summarization(
        &self,
        file: Vec<u8>,
        filename: &str,
        mime: &str,
        ctx: &RequestContext,
    ) -> Result<DocumentSummary> {
        let principal = ctx.require_principal()?;
        if file.is_empty() {
            return Err(GranskaError::InvalidInput("No document file provided".to_string()));
        }

        let mut metadata = Map::new();
        metadata.insert("fileSize".to_string(), json!(file.len()));
        metadata.insert("fileType".to_string(), json!(mime));

        let task = Task::new(&principal.id, TaskKind::DocumentSummarization, filename, metadata);
        self.store.insert(&task)?;

        match self.run_document(&task, file, filename, mime).await {
            Ok(result) => Ok(result),
            Err(err) => self.record_failure(task.id, err),
        }
    }

    async fn run_document(
        &self,
        task: &Task,
        file: Vec<u8>,
        filename: &str,
        mime: &str,
    ) -> Result<DocumentSummary> {
        let stored_path = self.uploads.persist(filename, &file).await?;
        self.store
            .update_input(task.id, &stored_path.to_string_lossy())?;

        let content =
            extract_document(&file, filename, mime, self.settings.fetch.max_document_tokens)?;

        let raw = self
            .summarize_with_fallback(
                SUMMARY_SYSTEM_PROMPT,
                &format!("Please analyze and summarize this document:\n\n{}", content.text),
                word_count(&content.text),
                Some(ResponseShape::Summary),
            )
            .await?;

        let normalized = normalize(&raw, ResponseShape::Summary);
        let fields = match normalized.analysis {
            Analysis::Summary(fields) => fields,
            Analysis::Image(_) => unreachable!("summary shape requested"),
        };

        let mut metadata = Map::new();
        if let Some(pages) = content.page_count {
            metadata.insert("pages".to_string(), json!(pages));
        }
        metadata.insert("title".to_string(), json!(content.title));
        metadata.insert("author".to_string(), json!(content.author));
        metadata.insert("wordCount".to_string(), json!(word_count(&content.text)));
        metadata.insert(
            "originalWordCount".to_string(),
            json!(content.original_word_count),
        );
        if content.truncated {
            metadata.insert("truncated".to_string(), json!(true));
        }
        if normalized.degraded {
            metadata.insert("normalizationDegraded".to_string(), json!(true));
        }

        let result = DocumentSummary {
            summary: fields.summary,
            key_points: fields.key_points,
            topics: fields.topics,
            metadata: metadata.clone(),
        };

        self.finalize(task.id, &serde_json::to_string(&result)?, metadata)?;
        Ok(result)
    }

    /// Fetch and summarize a web page.
    #[instrument(skip(self, ctx))]
    pub async fn submit_url_summarization(
        &self,
        url: &str,
        ctx: &RequestContext,
    ) -> Result<UrlSummary> {
        let principal = ctx.require_principal()?;
        if url.trim().is_empty() {
            return Err(GranskaError::InvalidInput("No URL provided".to_string()));
        }
        if url::Url::parse(url).is_err() {
            return Err(GranskaError::InvalidInput("Invalid URL format".to_string()));
        }

        let mut metadata = Map::new();
        metadata.insert("url".to_string(), json!(url));

        let task = Task::new(&principal.id, TaskKind::UrlSummarization, url, metadata);
        self.store.insert(&task)?;

        match self.run_url(&task, url).await {
            Ok(result) => Ok(result),
            Err(err) => self.record_failure(task.id, err),
        }
    }

    async fn run_url(&self, task: &Task, url: &str) -> Result<UrlSummary> {
        let page = self.pages.fetch_page(url).await?;

        let raw = self
            .summarize_with_fallback(
                SUMMARY_SYSTEM_PROMPT,
                &format!(
                    "Please analyze and summarize this web content:\n\nTitle: {}\n\nContent: {}",
                    page.title, page.text
                ),
                page.word_count,
                Some(ResponseShape::Summary),
            )
            .await?;

        let normalized = normalize(&raw, ResponseShape::Summary);
        let fields = match normalized.analysis {
            Analysis::Summary(fields) => fields,
            Analysis::Image(_) => unreachable!("summary shape requested"),
        };

        let mut metadata = Map::new();
        metadata.insert("title".to_string(), json!(page.title));
        metadata.insert("description".to_string(), json!(page.description));
        metadata.insert("author".to_string(), json!(page.author));
        metadata.insert("wordCount".to_string(), json!(page.word_count));
        metadata.insert("readingTime".to_string(), json!(page.reading_time_minutes));
        if normalized.degraded {
            metadata.insert("normalizationDegraded".to_string(), json!(true));
        }

        let result = UrlSummary {
            original_url: url.to_string(),
            summary: fields.summary,
            key_points: fields.key_points,
            topics: fields.topics,
            metadata: metadata.clone(),
        };

        self.finalize(task.id, &serde_json::to_string(&result)?, metadata)?;
        Ok(result)
    }

    /// Diarize, swallowing failures: the one designed degradation path.
    async fn diarize_leniently(&self, audio_path: &std::path::Path) -> Vec<DiarizationSegment> {
        if !self.settings.diarization.enabled {
            return Vec::new();
        }

        match self.diarizer.diarize(audio_path).await {
            Ok(segments) => segments,
            Err(err) => {
                warn!("Diarization failed, continuing without it: {}", err);
                Vec::new()
            }
        }
    }

    /// Call the chat backend, substituting a local templated reply when
    /// the provider reports an exhausted quota.
    async fn summarize_with_fallback(
        &self,
        system: &str,
        user: &str,
        word_count: usize,
        shape: Option<ResponseShape>,
    ) -> Result<String> {
        match self.chat.complete(system, user).await {
            Ok(reply) => Ok(reply),
            Err(GranskaError::QuotaExceeded(msg)) => {
                warn!("Provider quota exceeded, using local fallback: {}", msg);
                Ok(match shape {
                    Some(shape) => quota_fallback_reply(shape, word_count),
                    None => plain_quota_fallback(word_count),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Merge accumulated metadata and record the single Completed
    /// transition for this task.
    fn finalize(&self, task_id: Uuid, output: &str, metadata: Map<String, Value>) -> Result<()> {
        self.store.merge_metadata(task_id, &metadata)?;
        self.store.complete(task_id, output)?;
        info!("Task {} completed", task_id);
        Ok(())
    }

    /// Record the Failed transition and re-raise the original error.
    fn record_failure<T>(&self, task_id: Uuid, err: GranskaError) -> Result<T> {
        error!("Task {} failed: {}", task_id, err);
        if let Err(store_err) = self.store.fail(task_id, &err.to_string()) {
            error!("Could not record failure for task {}: {}", task_id, store_err);
        }
        Err(err)
    }
}

/// Templated degraded-but-successful reply for quota exhaustion.
fn quota_fallback_reply(shape: ResponseShape, word_count: usize) -> String {
    match shape {
        ResponseShape::Summary => json!({
            "summary": format!(
                "This content contains {} words. Due to API quota limits, a detailed summary \
                 is not available. Please check your provider billing to continue using this \
                 feature.",
                word_count
            ),
            "keyPoints": ["Content processed successfully", "API quota exceeded"],
            "topics": ["Content Analysis", "API Limits"],
        })
        .to_string(),
        ResponseShape::ImageDescription => json!({
            "description": "Image stored successfully. Due to API quota limits, a detailed \
                            description is not available.",
            "objects": [],
            "colors": [],
            "tags": [],
        })
        .to_string(),
    }
}

fn plain_quota_fallback(word_count: usize) -> String {
    format!(
        "This conversation contains {} words. Due to API quota limits, a detailed summary is \
         not available.",
        word_count
    )
}

/// Best-effort MIME type from a filename extension.
fn mime_for_filename(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(|e| e.to_lowercase()).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Transcript, TranscriptSegment};
    use async_trait::async_trait;
    use std::path::Path;

    struct MockChat {
        reply: Option<String>,
        error: Option<fn() -> GranskaError>,
    }

    impl MockChat {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                error: None,
            }
        }

        fn failing(error: fn() -> GranskaError) -> Self {
            Self {
                reply: None,
                error: Some(error),
            }
        }
    }

    #[async_trait]
    impl ChatModel for MockChat {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            match &self.error {
                Some(make) => Err(make()),
                None => Ok(self.reply.clone().unwrap()),
            }
        }

        async fn describe_image(&self, _image: &[u8], _mime: &str, _prompt: &str) -> Result<String> {
            self.complete("", "").await
        }
    }

    struct MockTranscriber;

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(&self, _audio: &[u8], _filename: &str) -> Result<Transcript> {
            Ok(Transcript {
                text: "hello there everyone".to_string(),
                duration_seconds: 12.5,
                language: Some("english".to_string()),
                segments: vec![TranscriptSegment {
                    start: 0.0,
                    end: 12.5,
                    text: "hello there everyone".to_string(),
                }],
            })
        }
    }

    struct MockDiarizer {
        fail: bool,
    }

    #[async_trait]
    impl Diarizer for MockDiarizer {
        async fn diarize(&self, _audio_path: &Path) -> Result<Vec<DiarizationSegment>> {
            if self.fail {
                return Err(GranskaError::Diarization("service down".to_string()));
            }
            Ok(vec![
                DiarizationSegment {
                    speaker: 0,
                    start: 0.0,
                    end: 6.0,
                    text: None,
                },
                DiarizationSegment {
                    speaker: 1,
                    start: 6.0,
                    end: 12.5,
                    text: None,
                },
            ])
        }
    }

    struct MockFetcher;

    #[async_trait]
    impl PageFetcher for MockFetcher {
        async fn fetch_page(&self, _url: &str) -> Result<crate::extract::PageContent> {
            Ok(crate::extract::PageContent {
                title: "T".to_string(),
                description: Some("D".to_string()),
                author: None,
                text: "a page about rust".to_string(),
                word_count: 4,
                reading_time_minutes: 1,
            })
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        _uploads: tempfile::TempDir,
    }

    fn fixture(chat: MockChat, diarizer_fails: bool) -> Fixture {
        let uploads = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.uploads_dir = uploads.path().to_string_lossy().to_string();

        let orchestrator = Orchestrator::with_components(
            settings,
            Arc::new(TaskStore::in_memory().unwrap()),
            Arc::new(chat),
            Arc::new(MockTranscriber),
            Arc::new(MockDiarizer {
                fail: diarizer_fails,
            }),
            Arc::new(MockFetcher),
        )
        .unwrap();

        Fixture {
            orchestrator,
            _uploads: uploads,
        }
    }

    fn owner_tasks(orchestrator: &Orchestrator, owner: &str) -> Vec<Task> {
        orchestrator
            .store()
            .list(owner, &TaskFilter::default(), 50, 0)
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn conversation_submit_completes_with_diarization() {
        let f = fixture(MockChat::replying("A short chat about greetings."), false);
        let ctx = RequestContext::authenticated("user-1");

        let result = f
            .orchestrator
            .submit_conversation_analysis(b"fake audio".to_vec(), "chat.mp3", &ctx)
            .await
            .unwrap();

        assert_eq!(result.transcription, "hello there everyone");
        assert_eq!(result.diarization.len(), 2);
        assert_eq!(result.summary, "A short chat about greetings.");
        assert_eq!(result.metadata["speakers"], json!(2));

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, crate::task::TaskStatus::Completed);
        // Stored output deserializes back into the result shape
        let stored: ConversationAnalysis =
            serde_json::from_str(tasks[0].output.as_deref().unwrap()).unwrap();
        assert_eq!(stored.transcription, result.transcription);
        // Input was replaced with the stored file path
        assert!(tasks[0].input.ends_with("chat.mp3"));
        assert_ne!(tasks[0].input, "chat.mp3");
    }

    #[tokio::test]
    async fn diarization_failure_still_completes() {
        let f = fixture(MockChat::replying("Summary."), true);
        let ctx = RequestContext::authenticated("user-1");

        let result = f
            .orchestrator
            .submit_conversation_analysis(b"fake audio".to_vec(), "chat.mp3", &ctx)
            .await
            .unwrap();

        assert!(result.diarization.is_empty());
        assert_eq!(result.metadata["speakers"], json!(1));

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks[0].status, crate::task::TaskStatus::Completed);
    }

    #[tokio::test]
    async fn url_submit_completes_with_page_metadata() {
        let f = fixture(
            MockChat::replying(r#"{"summary":"about rust","keyPoints":["k"],"topics":["t"]}"#),
            false,
        );
        let ctx = RequestContext::authenticated("user-1");

        let result = f
            .orchestrator
            .submit_url_summarization("https://example.com/article", &ctx)
            .await
            .unwrap();

        assert_eq!(result.original_url, "https://example.com/article");
        assert_eq!(result.summary, "about rust");
        assert_eq!(result.key_points, vec!["k"]);
        assert_eq!(result.metadata["title"], json!("T"));
        assert_eq!(result.metadata["wordCount"], json!(4));
        assert_eq!(result.metadata["readingTime"], json!(1));

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, crate::task::TaskStatus::Completed);
        // URL submissions keep the URL as the input reference
        assert_eq!(tasks[0].input, "https://example.com/article");
        let stored: UrlSummary =
            serde_json::from_str(tasks[0].output.as_deref().unwrap()).unwrap();
        assert_eq!(stored.summary, result.summary);
    }

    #[tokio::test]
    async fn unauthenticated_submit_creates_no_task() {
        let f = fixture(MockChat::replying("unused"), false);
        let ctx = RequestContext::anonymous();

        let err = f
            .orchestrator
            .submit_url_summarization("https://example.com", &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GranskaError::Unauthenticated));

        let (_, total) = f
            .orchestrator
            .store()
            .list("", &TaskFilter::default(), 50, 0)
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_any_row() {
        let f = fixture(MockChat::replying("unused"), false);
        let ctx = RequestContext::authenticated("user-1");

        let err = f
            .orchestrator
            .submit_url_summarization("not a url", &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GranskaError::InvalidInput(_)));
        assert!(owner_tasks(&f.orchestrator, "user-1").is_empty());
    }

    #[tokio::test]
    async fn quota_exhaustion_completes_with_fallback_summary() {
        let f = fixture(
            MockChat::failing(|| GranskaError::QuotaExceeded("You exceeded your quota".into())),
            false,
        );
        let ctx = RequestContext::authenticated("user-1");

        // 5-word docx so the fallback can cite the word count
        let docx = docx_with_text("one two three four five");
        let result = f
            .orchestrator
            .submit_document_summarization(docx, "doc.docx", "application/octet-stream", &ctx)
            .await
            .unwrap();

        assert!(result.summary.contains("5 words"));
        assert!(!result.key_points.is_empty());

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks[0].status, crate::task::TaskStatus::Completed);
    }

    #[tokio::test]
    async fn provider_error_fails_the_task_and_reraises() {
        let f = fixture(
            MockChat::failing(|| GranskaError::ProviderError("backend exploded".into())),
            false,
        );
        let ctx = RequestContext::authenticated("user-1");

        let docx = docx_with_text("some document text");
        let err = f
            .orchestrator
            .submit_document_summarization(docx, "doc.docx", "application/octet-stream", &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GranskaError::ProviderError(_)));

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, crate::task::TaskStatus::Failed);
        assert!(tasks[0]
            .output
            .as_deref()
            .unwrap()
            .contains("backend exploded"));
    }

    #[tokio::test]
    async fn unsupported_document_yields_failed_row() {
        let f = fixture(MockChat::replying("unused"), false);
        let ctx = RequestContext::authenticated("user-1");

        let err = f
            .orchestrator
            .submit_document_summarization(b"plain".to_vec(), "notes.txt", "text/plain", &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GranskaError::UnsupportedFormat(_)));

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, crate::task::TaskStatus::Failed);
    }

    #[tokio::test]
    async fn image_submit_normalizes_fenced_reply() {
        let reply = "```json\n{\"description\":\"a red cup\",\"objects\":[\"cup\"],\
                     \"colors\":[\"red\"],\"tags\":[\"kitchen\"]}\n```";
        let f = fixture(MockChat::replying(reply), false);
        let ctx = RequestContext::authenticated("user-1");

        let result = f
            .orchestrator
            .submit_image_analysis(b"fake image".to_vec(), "image/png", "cup.png", &ctx)
            .await
            .unwrap();

        assert_eq!(result.description, "a red cup");
        assert_eq!(result.objects, vec!["cup"]);
        assert!(!result.metadata.contains_key("normalizationDegraded"));

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks[0].status, crate::task::TaskStatus::Completed);
    }

    #[tokio::test]
    async fn unstructured_image_reply_sets_degraded_flag() {
        let f = fixture(MockChat::replying("it is a cup, nothing more"), false);
        let ctx = RequestContext::authenticated("user-1");

        let result = f
            .orchestrator
            .submit_image_analysis(b"fake image".to_vec(), "image/png", "cup.png", &ctx)
            .await
            .unwrap();

        assert_eq!(result.description, "it is a cup, nothing more");
        assert_eq!(result.metadata["normalizationDegraded"], json!(true));

        let tasks = owner_tasks(&f.orchestrator, "user-1");
        assert_eq!(tasks[0].metadata["normalizationDegraded"], json!(true));
    }

    #[tokio::test]
    async fn document_metadata_records_truncation() {
        let f = fixture(
            MockChat::replying(r#"{"summary":"s","keyPoints":[],"topics":[]}"#),
            false,
        );
        let ctx = RequestContext::authenticated("user-1");

        let docx = docx_with_text(&"word ".repeat(9000));
        let result = f
            .orchestrator
            .submit_document_summarization(docx, "big.docx", "application/octet-stream", &ctx)
            .await
            .unwrap();

        assert_eq!(result.metadata["truncated"], json!(true));
        assert_eq!(result.metadata["originalWordCount"], json!(9000));
        // wordCount reflects the text actually summarized
        let kept = (8000f64 / 1.3).floor() as usize;
        assert_eq!(result.metadata["wordCount"], json!(kept));
    }

    #[tokio::test]
    async fn list_tasks_requires_a_principal() {
        let f = fixture(MockChat::replying("unused"), false);
        let err = f
            .orchestrator
            .list_tasks(&RequestContext::anonymous(), &TaskFilter::default(), 50, 0)
            .unwrap_err();
        assert!(matches!(err, GranskaError::Unauthenticated));
    }

    fn docx_with_text(text: &str) -> Vec<u8> {
        use std::io::Write;
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            let doc = format!(
                "<w:document><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
                text
            );
            zip.write_all(doc.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }
}
