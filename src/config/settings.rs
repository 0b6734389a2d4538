//! Configuration settings for Granska.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub providers: ProviderSettings,
    pub diarization: DiarizationSettings,
    pub fetch: FetchSettings,
    pub store: StoreSettings,
    pub server: ServerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory where uploaded files are persisted.
    pub uploads_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.granska".to_string(),
            uploads_dir: "~/.granska/uploads".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Chat/vision provider backend.
///
/// Exactly one backend is active per deployment; the alternatives are
/// interchangeable, never used simultaneously.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// OpenAI chat completions (default).
    #[default]
    OpenAi,
    /// Google Gemini generateContent.
    Gemini,
}

impl std::str::FromStr for ChatProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ChatProvider::OpenAi),
            "gemini" => Ok(ChatProvider::Gemini),
            _ => Err(format!("Unknown chat provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatProvider::OpenAi => write!(f, "openai"),
            ChatProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// AI provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Chat/vision backend (openai, gemini).
    pub chat: ChatProvider,
    /// Model for text summarization.
    pub chat_model: String,
    /// Model for image description (must be vision-capable).
    pub vision_model: String,
    /// Model for audio transcription.
    pub transcription_model: String,
    /// Token ceiling for summarization replies.
    pub max_summary_tokens: u32,
    /// Timeout for provider API requests, in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            chat: ChatProvider::OpenAi,
            chat_model: "gpt-4".to_string(),
            vision_model: "gpt-4o".to_string(),
            transcription_model: "whisper-1".to_string(),
            max_summary_tokens: 1000,
            request_timeout_seconds: 300,
        }
    }
}

/// Speaker diarization service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiarizationSettings {
    /// Whether to attempt diarization at all.
    pub enabled: bool,
    /// Base URL of the diarization sidecar service.
    pub endpoint: String,
    /// Timeout for diarization requests, in seconds.
    pub timeout_seconds: u64,
}

impl Default for DiarizationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://127.0.0.1:8001".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// URL fetch and content extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Timeout for fetching a submitted URL, in seconds.
    pub timeout_seconds: u64,
    /// User-Agent header sent with URL fetches.
    pub user_agent: String,
    /// Character ceiling for extracted page text (bounds prompt size).
    pub max_content_chars: usize,
    /// Approximate token budget for extracted document text.
    pub max_document_tokens: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            max_content_chars: 8000,
            max_document_tokens: 8000,
        }
    }
}

/// Task store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.granska/tasks.db".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Static bearer tokens mapped to principal identifiers.
    pub auth_tokens: HashMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            auth_tokens: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::GranskaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("granska")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded uploads directory path.
    pub fn uploads_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.uploads_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}
