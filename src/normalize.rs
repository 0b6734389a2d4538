//! Response normalization for AI replies.
//!
//! Models are asked for strict JSON but routinely reply with fenced code
//! blocks, prose preambles, or no JSON at all. `normalize` coerces any
//! raw reply into the fixed result shape for the task kind through
//! layered fallbacks, and never fails outright: the worst case degrades
//! to an unstructured passthrough with the whole reply in the shape's
//! free-text field.

use serde::{Deserialize, Serialize};

/// Expected result shape for a task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// summary / keyPoints / topics (documents and URLs).
    Summary,
    /// description / objects / colors / tags (images).
    ImageDescription,
}

/// Structured summarization fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryAnalysis {
    pub summary: String,
    #[serde(default, rename = "keyPoints")]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Structured image analysis fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub description: String,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A normalized analysis, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    Summary(SummaryAnalysis),
    Image(ImageAnalysis),
}

/// Result of normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub analysis: Analysis,
    /// True when every structural parse failed and the raw reply was
    /// passed through as the free-text field. Surfaced as a metadata
    /// flag, never as an error.
    pub degraded: bool,
}

/// Normalize a raw model reply into the given shape.
///
/// Stages, first success wins: strip fences/boilerplate and parse
/// directly; parse the first balanced `{...}` span; fall back to the raw
/// reply as unstructured text. Pure function: same input, same output.
pub fn normalize(raw: &str, shape: ResponseShape) -> Normalized {
    let cleaned = strip_boilerplate(raw);

    if let Some(analysis) = parse_shape(&cleaned, shape) {
        return Normalized {
            analysis,
            degraded: false,
        };
    }

    if let Some(span) = first_balanced_object(raw) {
        if let Some(analysis) = parse_shape(span, shape) {
            return Normalized {
                analysis,
                degraded: false,
            };
        }
    }

    let text = raw.trim().to_string();
    let analysis = match shape {
        ResponseShape::Summary => Analysis::Summary(SummaryAnalysis {
            summary: text,
            key_points: Vec::new(),
            topics: Vec::new(),
        }),
        ResponseShape::ImageDescription => Analysis::Image(ImageAnalysis {
            description: text,
            objects: Vec::new(),
            colors: Vec::new(),
            tags: Vec::new(),
        }),
    };

    Normalized {
        analysis,
        degraded: true,
    }
}

fn parse_shape(text: &str, shape: ResponseShape) -> Option<Analysis> {
    match shape {
        ResponseShape::Summary => serde_json::from_str::<SummaryAnalysis>(text)
            .ok()
            .map(Analysis::Summary),
        ResponseShape::ImageDescription => serde_json::from_str::<ImageAnalysis>(text)
            .ok()
            .map(Analysis::Image),
    }
}

/// Strip code fences and common prose preambles around a JSON body.
fn strip_boilerplate(raw: &str) -> String {
    let mut text = raw.trim();

    // Prose preamble on the first line ("Here's the JSON:", etc.)
    for prefix in ["here's the json", "here is the json", "json:"] {
        let lower = text.to_lowercase();
        if lower.starts_with(prefix) {
            if let Some(idx) = text.find(['{', '`', '\n']) {
                text = text[idx..].trim_start();
            }
            break;
        }
    }

    // Fenced code block: drop the opening fence line and the closing fence
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches(['\r', '\n']);
        text = rest.strip_suffix("```").map_or(rest, |r| r.trim_end());
    }

    text.trim().to_string()
}

/// Find the first balanced `{...}` span, respecting string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"summary\":\"x\",\"keyPoints\":[],\"topics\":[]}\n```";
        let result = normalize(raw, ResponseShape::Summary);
        assert!(!result.degraded);
        assert_eq!(
            result.analysis,
            Analysis::Summary(SummaryAnalysis {
                summary: "x".to_string(),
                key_points: vec![],
                topics: vec![],
            })
        );
    }

    #[test]
    fn parses_clean_json() {
        let raw = r#"{"summary":"s","keyPoints":["a","b"],"topics":["t"]}"#;
        let result = normalize(raw, ResponseShape::Summary);
        assert!(!result.degraded);
        match result.analysis {
            Analysis::Summary(s) => {
                assert_eq!(s.summary, "s");
                assert_eq!(s.key_points, vec!["a", "b"]);
                assert_eq!(s.topics, vec!["t"]);
            }
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn extracts_embedded_json_span() {
        let raw = "Sure! Here is the analysis you asked for:\n\
                   {\"summary\": \"embedded\", \"keyPoints\": [\"k\"], \"topics\": []}\n\
                   Let me know if you need anything else.";
        let result = normalize(raw, ResponseShape::Summary);
        assert!(!result.degraded);
        match result.analysis {
            Analysis::Summary(s) => assert_eq!(s.summary, "embedded"),
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn plain_prose_falls_back_to_passthrough() {
        let result = normalize("just some text", ResponseShape::Summary);
        assert!(result.degraded);
        assert_eq!(
            result.analysis,
            Analysis::Summary(SummaryAnalysis {
                summary: "just some text".to_string(),
                key_points: vec![],
                topics: vec![],
            })
        );
    }

    #[test]
    fn image_shape_passthrough_uses_description() {
        let result = normalize("a nice photo", ResponseShape::ImageDescription);
        assert!(result.degraded);
        match result.analysis {
            Analysis::Image(i) => {
                assert_eq!(i.description, "a nice photo");
                assert!(i.objects.is_empty());
                assert!(i.colors.is_empty());
                assert!(i.tags.is_empty());
            }
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn image_shape_parses_full_object() {
        let raw = r#"{"description":"d","objects":["cup"],"colors":["red"],"tags":["kitchen"]}"#;
        let result = normalize(raw, ResponseShape::ImageDescription);
        assert!(!result.degraded);
        match result.analysis {
            Analysis::Image(i) => {
                assert_eq!(i.objects, vec!["cup"]);
                assert_eq!(i.colors, vec!["red"]);
            }
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_span_search() {
        let raw = r#"note: {"summary":"uses { and } inside","keyPoints":[],"topics":[]} done"#;
        let result = normalize(raw, ResponseShape::Summary);
        assert!(!result.degraded);
        match result.analysis {
            Analysis::Summary(s) => assert_eq!(s.summary, "uses { and } inside"),
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let raw = "```json\n{\"summary\":\"x\"}\n```";
        let first = normalize(raw, ResponseShape::Summary);
        let second = normalize(raw, ResponseShape::Summary);
        assert_eq!(first, second);
    }
}
