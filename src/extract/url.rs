//! URL fetching and page text extraction.

use crate::config::FetchSettings;
use crate::error::{GranskaError, Result};
use crate::extract::word_count;
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};

/// Non-content elements stripped before body text collection.
const EXCLUDED_ELEMENTS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// Selectors tried, in order, for the main content region.
const CONTENT_SELECTORS: &str = "main, article, .content, .post, .entry";

/// Extracted page content and metadata.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Page title, or first heading if the title tag is empty.
    pub title: String,
    /// Meta description, if present.
    pub description: Option<String>,
    /// Meta author or byline text, if present.
    pub author: Option<String>,
    /// Collapsed, truncated body text.
    pub text: String,
    /// Word count of the extracted text.
    pub word_count: usize,
    /// Approximate reading time in minutes (200 words per minute).
    pub reading_time_minutes: u32,
}

/// Turns a submitted URL into readable page content.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the target and extract its content.
    async fn fetch_page(&self, url: &str) -> Result<PageContent>;
}

/// Fetches a URL and extracts its readable content.
pub struct UrlExtractor {
    client: reqwest::Client,
    max_chars: usize,
}

impl UrlExtractor {
    /// Create an extractor from fetch settings.
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| GranskaError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_chars: settings.max_content_chars,
        })
    }
}

#[async_trait]
impl PageFetcher for UrlExtractor {
    /// Network, DNS, and timeout errors, as well as non-success statuses,
    /// surface as `FetchFailed`.
    #[instrument(skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<PageContent> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GranskaError::FetchFailed(format!("Unable to access {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(GranskaError::FetchFailed(format!(
                "HTTP {} fetching {}",
                response.status(),
                url
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| GranskaError::FetchFailed(format!("Failed to read {}: {}", url, e)))?;

        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(parse_page(&html, self.max_chars))
    }
}

/// Parse fetched markup into page content.
///
/// Kept synchronous and separate from the fetch so the non-Send DOM
/// never lives across an await point.
pub(crate) fn parse_page(html: &str, max_chars: usize) -> PageContent {
    let doc = Html::parse_document(html);

    let title = select_text(&doc, "title")
        .or_else(|| select_text(&doc, "h1"))
        .unwrap_or_default();

    let description = select_attr(&doc, r#"meta[name="description"]"#, "content");
    let author = select_attr(&doc, r#"meta[name="author"]"#, "content")
        .or_else(|| select_text(&doc, ".author, .byline"));

    let content_root = Selector::parse(CONTENT_SELECTORS)
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|sel| doc.select(&sel).next())
        });

    let mut raw_text = String::new();
    if let Some(root) = content_root {
        collect_text(root, &mut raw_text);
    }

    let whitespace = Regex::new(r"\s+").unwrap();
    let collapsed = whitespace.replace_all(raw_text.trim(), " ").to_string();
    let text: String = collapsed.chars().take(max_chars).collect();

    let words = word_count(&text);
    let reading_time_minutes = words.div_ceil(200) as u32;

    PageContent {
        title,
        description,
        author,
        text,
        word_count: words,
        reading_time_minutes,
    }
}

/// Collect text below an element, skipping non-content subtrees.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !EXCLUDED_ELEMENTS.contains(&child_el.value().name()) {
                collect_text(child_el, out);
            }
        }
    }
}

fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let text = doc
        .select(&sel)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

fn select_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let value = doc.select(&sel).next()?.value().attr(attr)?.trim().to_string();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title>T</title>
            <meta name="description" content="D">
            <meta name="author" content="A. Writer">
          </head>
          <body>
            <nav>Home About Contact</nav>
            <script>var tracking = true;</script>
            <article>
              <h1>Heading</h1>
              <p>First paragraph of the article.</p>
              <p>Second paragraph with    extra   whitespace.</p>
            </article>
            <footer>Copyright</footer>
          </body>
        </html>
    "#;

    #[test]
    fn extracts_title_and_description() {
        let page = parse_page(PAGE, 8000);
        assert_eq!(page.title, "T");
        assert_eq!(page.description.as_deref(), Some("D"));
        assert_eq!(page.author.as_deref(), Some("A. Writer"));
    }

    #[test]
    fn strips_non_content_elements() {
        let page = parse_page(PAGE, 8000);
        assert!(page.text.contains("First paragraph"));
        assert!(!page.text.contains("tracking"));
        assert!(!page.text.contains("Copyright"));
        assert!(!page.text.contains("Home About"));
    }

    #[test]
    fn collapses_whitespace() {
        let page = parse_page(PAGE, 8000);
        assert!(page.text.contains("with extra whitespace"));
    }

    #[test]
    fn falls_back_to_h1_and_body() {
        let html = "<html><body><h1>Only Heading</h1><p>Body text here.</p></body></html>";
        let page = parse_page(html, 8000);
        assert_eq!(page.title, "Only Heading");
        assert!(page.text.contains("Body text here."));
    }

    #[test]
    fn truncates_to_char_ceiling() {
        let html = format!("<html><body><p>{}</p></body></html>", "word ".repeat(100));
        let page = parse_page(&html, 40);
        assert!(page.text.chars().count() <= 40);
    }

    #[test]
    fn computes_reading_time() {
        let html = format!("<html><body><p>{}</p></body></html>", "word ".repeat(250));
        let page = parse_page(&html, 8000);
        assert_eq!(page.word_count, 250);
        assert_eq!(page.reading_time_minutes, 2);
    }
}
