//! Content extraction for Granska.
//!
//! Turns an uploaded file or fetched URL into analyzable text plus
//! metadata. Audio and image submissions need no extraction: audio bytes
//! pass straight to the transcription provider, image bytes are
//! base64-encoded for the vision call.

mod document;
mod url;

pub use document::{extract_document, DocumentContent};
pub use url::{PageContent, PageFetcher, UrlExtractor};

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
