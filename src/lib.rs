//! Granska - Media Analysis Tasks
//!
//! A service that turns user-submitted media into AI-generated analyses
//! recorded as durable task records. The name "Granska" comes from the
//! Scandinavian word for "examine."
//!
//! # Overview
//!
//! Granska accepts four kinds of submissions:
//! - Audio conversations: transcription, speaker diarization, summary
//! - Images: description, detected objects, colors, tags
//! - Documents (PDF, DOCX): summary, key points, topics
//! - URLs: fetched, stripped to readable text, then summarized
//!
//! Every submission creates a durable task row that moves through
//! `PROCESSING -> {COMPLETED | FAILED}` and stays queryable by its owner
//! regardless of outcome.
//!
//! # Architecture
//!
//! - `config` - Configuration management
//! - `auth` - Principal resolution for request contexts
//! - `task` - Task records and the SQLite task store
//! - `extract` - Content extraction (URLs, PDF/DOCX documents)
//! - `provider` - Adapters for AI backends (chat, vision, transcription,
//!   diarization)
//! - `normalize` - Coercion of free-form AI replies into fixed shapes
//! - `storage` - Durable storage for uploaded files
//! - `orchestrator` - The task lifecycle state machine
//!
//! # Example
//!
//! ```rust,no_run
//! use granska::auth::RequestContext;
//! use granska::config::Settings;
//! use granska::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let ctx = RequestContext::authenticated("user-1");
//!     let result = orchestrator
//!         .submit_url_summarization("https://example.com/article", &ctx)
//!         .await?;
//!     println!("{}", result.summary);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod orchestrator;
pub mod provider;
pub mod storage;
pub mod task;

pub use error::{GranskaError, Result};
