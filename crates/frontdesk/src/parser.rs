//! Free-text memo parsing.
//!
//! Thin wrapper around the Gemini `generateContent` endpoint that extracts a
//! name and a memo from whatever the desk typed. Every failure collapses to
//! `None`; callers fall back to [`split_fallback`].

use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entry::DEFAULT_MEMO;
use crate::error::{Error, Result};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A name/memo pair extracted from raw input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMemo {
    /// Who the memo is about.
    pub name: String,
    /// The memo text.
    #[serde(rename = "treatment", alias = "memo")]
    pub memo: String,
}

impl ParsedMemo {
    /// Build a pair from owned parts.
    #[must_use]
    pub fn new(name: impl Into<String>, memo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memo: memo.into(),
        }
    }
}

// -- Response types --

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

/// Gemini client for memo extraction.
#[derive(Debug, Clone)]
pub struct TextParser {
    client: reqwest::Client,
    model: String,
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl TextParser {
    /// Create a parser using `model`.
    #[must_use]
    pub fn new(model: &str) -> Self {
        let model = if model.trim().is_empty() {
            DEFAULT_MODEL
        } else {
            model.trim()
        };

        // Builder only fails when the TLS backend cannot initialise.
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            model: model.to_string(),
        }
    }

    /// The model requests are sent to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extract a name and memo from `raw`.
    ///
    /// Returns `None` without a request when the key or the trimmed text is
    /// empty, and `None` on any request or decoding failure.
    pub async fn parse(&self, raw: &str, api_key: &str) -> Option<ParsedMemo> {
        let api_key = api_key.trim();
        if api_key.is_empty() || raw.trim().is_empty() {
            return None;
        }

        match self.request(raw, api_key).await {
            Ok(parsed) => {
                debug!("Parsed memo for {}", parsed.name);
                Some(parsed)
            }
            Err(e) => {
                warn!("Memo parsing failed: {}", e);
                None
            }
        }
    }

    /// Parse with the service, falling back to the whitespace split.
    pub async fn resolve(&self, raw: &str, api_key: &str) -> Option<ParsedMemo> {
        if raw.trim().is_empty() {
            return None;
        }
        match self.parse(raw, api_key).await {
            Some(parsed) => Some(parsed),
            None => split_fallback(raw),
        }
    }

    async fn request(&self, raw: &str, api_key: &str) -> Result<ParsedMemo> {
        let url = format!("{}/{}:generateContent", GEMINI_ENDPOINT, self.model);
        let body = build_request_body(raw);

        info!("Gemini memo extraction: {} chars", raw.len());

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(
                "x-goog-api-key",
                HeaderValue::from_str(api_key)
                    .map_err(|e| Error::parse(format!("invalid API key header: {e}")))?,
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let truncated: String = error_body.chars().take(200).collect();
            return Err(Error::parse(format!("Gemini API error {status}: {truncated}")));
        }

        let gemini: GeminiResponse = response.json().await?;
        extract_memo(&gemini)
    }
}

fn prompt(raw: &str) -> String {
    format!(
        "Extract the name and the memo content (e.g., treatment, schedule change, message) \
         from this text: \"{raw}\".\n\
         If the text is just a name, assume the memo content is \"{DEFAULT_MEMO}\".\n\
         The output must be JSON with keys 'name' and 'treatment' \
         (where 'treatment' holds the memo content)."
    )
}

/// Request body asking for a structured `{name, treatment}` object.
#[must_use]
pub fn build_request_body(raw: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": prompt(raw) }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "name": { "type": "STRING" },
                    "treatment": { "type": "STRING" }
                },
                "required": ["name", "treatment"]
            }
        }
    })
}

fn extract_memo(response: &GeminiResponse) -> Result<ParsedMemo> {
    let text = response
        .candidates
        .first()
        .and_then(|c| c.content.parts.iter().find_map(|p| p.text.as_deref()))
        .ok_or_else(|| Error::parse("response contained no text"))?;

    let parsed: ParsedMemo = serde_json::from_str(text.trim())?;
    if parsed.name.trim().is_empty() {
        return Err(Error::parse("response had an empty name"));
    }
    Ok(parsed)
}

/// Split on the first whitespace: name, then the rest as memo.
///
/// Text with no whitespace becomes the name with the placeholder memo.
#[must_use]
pub fn split_fallback(raw: &str) -> Option<ParsedMemo> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    match text.split_once(char::is_whitespace) {
        Some((name, rest)) => {
            let memo = rest.trim();
            let memo = if memo.is_empty() { DEFAULT_MEMO } else { memo };
            Some(ParsedMemo::new(name, memo))
        }
        None => Some(ParsedMemo::new(text, DEFAULT_MEMO)),
    }
}

/// Validate a manually entered pair: both fields are required.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] naming the first blank field.
pub fn manual(name: &str, memo: &str) -> Result<ParsedMemo> {
    let name = name.trim();
    let memo = memo.trim();
    if name.is_empty() {
        return Err(Error::EmptyInput("name"));
    }
    if memo.is_empty() {
        return Err(Error::EmptyInput("memo"));
    }
    Ok(ParsedMemo::new(name, memo))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(value: serde_json::Value) -> GeminiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_split_fallback_name_and_memo() {
        assert_eq!(
            split_fallback("John Pain"),
            Some(ParsedMemo::new("John", "Pain"))
        );
    }

    #[test]
    fn test_split_fallback_keeps_rest_intact() {
        assert_eq!(
            split_fallback("  Kim   4시로  변경 "),
            Some(ParsedMemo::new("Kim", "4시로  변경"))
        );
    }

    #[test]
    fn test_split_fallback_name_only() {
        assert_eq!(
            split_fallback("Solo"),
            Some(ParsedMemo::new("Solo", DEFAULT_MEMO))
        );
    }

    #[test]
    fn test_split_fallback_empty() {
        assert_eq!(split_fallback("   "), None);
    }

    #[tokio::test]
    async fn test_parse_without_key_is_none() {
        let parser = TextParser::default();
        assert_eq!(parser.parse("John Pain", "").await, None);
        assert_eq!(parser.parse("John Pain", "   ").await, None);
    }

    #[tokio::test]
    async fn test_parse_empty_text_is_none() {
        let parser = TextParser::default();
        assert_eq!(parser.parse("  ", "key").await, None);
    }

    #[tokio::test]
    async fn test_resolve_without_key_uses_fallback() {
        let parser = TextParser::default();
        assert_eq!(
            parser.resolve("John Pain", "").await,
            Some(ParsedMemo::new("John", "Pain"))
        );
        assert_eq!(
            parser.resolve("Solo", "").await,
            Some(ParsedMemo::new("Solo", DEFAULT_MEMO))
        );
        assert_eq!(parser.resolve("", "").await, None);
    }

    #[test]
    fn test_build_request_body() {
        let body = build_request_body("Kim ultrasound");
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("\"Kim ultrasound\""));
        assert!(prompt.contains(DEFAULT_MEMO));

        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["required"][0], "name");
        assert_eq!(config["responseSchema"]["required"][1], "treatment");
    }

    #[test]
    fn test_extract_memo_valid() {
        let gemini = response(serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "{\"name\":\"Kim\",\"treatment\":\"ultrasound\"}" }]
                }
            }]
        }));
        assert_eq!(
            extract_memo(&gemini).unwrap(),
            ParsedMemo::new("Kim", "ultrasound")
        );
    }

    #[test]
    fn test_extract_memo_not_json() {
        let gemini = response(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot help" }] } }]
        }));
        assert!(extract_memo(&gemini).is_err());
    }

    #[test]
    fn test_extract_memo_empty_candidates() {
        let gemini = response(serde_json::json!({ "candidates": [] }));
        assert!(extract_memo(&gemini).is_err());
    }

    #[test]
    fn test_extract_memo_blank_name() {
        let gemini = response(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"name\":\" \",\"treatment\":\"x\"}" }] }
            }]
        }));
        assert!(extract_memo(&gemini).is_err());
    }

    #[test]
    fn test_manual_requires_both_fields() {
        assert_eq!(
            manual(" Kim ", " taping ").unwrap(),
            ParsedMemo::new("Kim", "taping")
        );
        assert!(matches!(manual("", "taping"), Err(Error::EmptyInput("name"))));
        assert!(matches!(manual("Kim", "  "), Err(Error::EmptyInput("memo"))));
    }

    #[test]
    fn test_parser_model_default() {
        assert_eq!(TextParser::new("  ").model(), DEFAULT_MODEL);
        assert_eq!(TextParser::new("gemini-x").model(), "gemini-x");
    }
}
