//! Document text extraction (PDF, DOCX).

use crate::error::{GranskaError, Result};
use crate::extract::word_count;
use regex::Regex;
use std::io::Read;
use tracing::{debug, instrument};

/// Approximate tokens per word for budget estimation.
const TOKENS_PER_WORD: f64 = 1.3;

/// Extracted document text and metadata.
#[derive(Debug, Clone)]
pub struct DocumentContent {
    /// Extracted text, possibly truncated to the token budget.
    pub text: String,
    /// Page count (PDF only).
    pub page_count: Option<usize>,
    /// Document title from embedded metadata (PDF only).
    pub title: Option<String>,
    /// Document author from embedded metadata (PDF only).
    pub author: Option<String>,
    /// Word count before truncation.
    pub original_word_count: usize,
    /// Whether the text was cut down to fit the token budget.
    pub truncated: bool,
}

/// Extract analyzable text from a document, dispatching on MIME type and
/// file extension. Unknown formats fail with `UnsupportedFormat`.
#[instrument(skip(bytes), fields(filename = %filename, size = bytes.len()))]
pub fn extract_document(
    bytes: &[u8],
    filename: &str,
    mime: &str,
    max_tokens: usize,
) -> Result<DocumentContent> {
    let lower = filename.to_lowercase();

    let (text, page_count, title, author) = if mime == "application/pdf" || lower.ends_with(".pdf")
    {
        extract_pdf(bytes)?
    } else if lower.ends_with(".docx") || lower.ends_with(".doc") {
        (extract_docx(bytes)?, None, None, None)
    } else {
        return Err(GranskaError::UnsupportedFormat(format!(
            "Unsupported document format: {} ({})",
            filename, mime
        )));
    };

    let original_word_count = word_count(&text);
    let estimated_tokens = original_word_count as f64 * TOKENS_PER_WORD;

    let (text, truncated) = if estimated_tokens > max_tokens as f64 {
        let keep = (max_tokens as f64 / TOKENS_PER_WORD).floor() as usize;
        let clipped = text
            .split_whitespace()
            .take(keep)
            .collect::<Vec<_>>()
            .join(" ");
        debug!(
            "Truncated document from {} to {} words",
            original_word_count, keep
        );
        (clipped, true)
    } else {
        (text, false)
    };

    Ok(DocumentContent {
        text,
        page_count,
        title,
        author,
        original_word_count,
        truncated,
    })
}

type PdfFields = (String, Option<usize>, Option<String>, Option<String>);

fn extract_pdf(bytes: &[u8]) -> Result<PdfFields> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| GranskaError::UnsupportedFormat(format!("Failed to parse PDF: {}", e)))?;

    let pages: Vec<u32> = doc.get_pages().keys().cloned().collect();
    let page_count = pages.len();

    let text = doc
        .extract_text(&pages)
        .map_err(|e| GranskaError::UnsupportedFormat(format!("Failed to read PDF text: {}", e)))?;

    let title = pdf_info_string(&doc, b"Title");
    let author = pdf_info_string(&doc, b"Author");

    Ok((text, Some(page_count), title, author))
}

/// Read a string entry from the PDF Info dictionary, if present.
fn pdf_info_string(doc: &lopdf::Document, key: &[u8]) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let dict = match info {
        lopdf::Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
        lopdf::Object::Dictionary(dict) => dict,
        _ => return None,
    };

    match dict.get(key).ok()? {
        lopdf::Object::String(bytes, _) => {
            let value = String::from_utf8_lossy(bytes).trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        _ => None,
    }
}

/// Pull raw text out of a DOCX archive (word/document.xml).
fn extract_docx(bytes: &[u8]) -> Result<String> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| GranskaError::UnsupportedFormat(format!("Failed to open DOCX: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| GranskaError::UnsupportedFormat(format!("Not a DOCX archive: {}", e)))?
        .read_to_string(&mut xml)?;

    // Paragraph ends become line breaks, every other tag is dropped
    let with_breaks = xml.replace("</w:p>", "\n");
    let tag_re = Regex::new(r"<[^>]+>").unwrap();
    let stripped = tag_re.replace_all(&with_breaks, " ");

    let whitespace = Regex::new(r"[ \t]+").unwrap();
    let text = whitespace
        .replace_all(&decode_entities(&stripped), " ")
        .trim()
        .to_string();

    Ok(text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let doc = format!("<w:document><w:body>{}</w:body></w:document>", body);
            zip.write_all(doc.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn docx_text_is_extracted() {
        let bytes = docx_bytes(&["First paragraph.", "Second &amp; final."]);
        let content = extract_document(&bytes, "notes.docx", "application/octet-stream", 8000)
            .unwrap();
        assert!(content.text.contains("First paragraph."));
        assert!(content.text.contains("Second & final."));
        assert!(!content.truncated);
        assert_eq!(content.page_count, None);
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let err = extract_document(b"hello", "notes.txt", "text/plain", 8000).unwrap_err();
        assert!(matches!(err, GranskaError::UnsupportedFormat(_)));
    }

    #[test]
    fn oversized_document_is_truncated() {
        let long = "word ".repeat(9000);
        let bytes = docx_bytes(&[&long]);
        let content =
            extract_document(&bytes, "big.docx", "application/octet-stream", 8000).unwrap();
        assert!(content.truncated);
        assert_eq!(content.original_word_count, 9000);
        let kept = (8000f64 / 1.3).floor() as usize;
        assert_eq!(content.text.split_whitespace().count(), kept);
    }

    #[test]
    fn corrupt_pdf_is_unsupported() {
        let err = extract_document(b"not a pdf", "broken.pdf", "application/pdf", 8000)
            .unwrap_err();
        assert!(matches!(err, GranskaError::UnsupportedFormat(_)));
    }
}
