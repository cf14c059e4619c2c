// src/gemini.rs

use crate::error::ExtractError;
use crate::normalize::excerpt;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// The prompt that instructs the model what to pull out of the receipt.
const EXTRACTION_PROMPT: &str = r#"Analyze the attached PDF receipt/invoice and extract the following:
1. The service or product the expense was for (e.g. "Claude Pro", "Posit", "OpenAI API"). Use the most specific description available.
2. The date the payment was made or the invoice was issued (YYYY-MM-DD preferred).
3. The total amount paid, keeping the currency symbol or suffix (e.g. "$20.00", "¥3000").

Answer only via the given schema; set fields you cannot find to null."#;

/// Anything that can turn PDF bytes into the service's raw JSON text.
/// The pipeline is written against this seam so it can be driven by a
/// scripted fake in tests.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, pdf_bytes: &[u8]) -> Result<String, ExtractError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

/// Schema constraining the model's answer to three nullable strings.
fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "purpose": {
                "type": "STRING",
                "description": "The extracted service or product name",
                "nullable": true
            },
            "date": {
                "type": "STRING",
                "description": "The extracted billing or payment date",
                "nullable": true
            },
            "amount_str": {
                "type": "STRING",
                "description": "The extracted total amount string",
                "nullable": true
            }
        }
    })
}

/// Client for the Gemini `generateContent` endpoint.
///
/// Does not retry; every failure surfaces as a typed `ExtractError`
/// and the pipeline decides per-document disposition.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        GeminiClient {
            http: Client::new(),
            api_key,
            model,
        }
    }

    fn build_request(&self, pdf_bytes: &[u8]) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(EXTRACTION_PROMPT.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "application/pdf".to_string(),
                            data: BASE64.encode(pdf_bytes),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            },
        }
    }
}

#[async_trait]
impl Extractor for GeminiClient {
    async fn extract(&self, pdf_bytes: &[u8]) -> Result<String, ExtractError> {
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let request = self.build_request(pdf_bytes);

        info!(model = %self.model, pdf_bytes = pdf_bytes.len(), "Calling extraction service");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(ExtractError::Connection)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(ExtractError::Connection)?;

        interpret_response(status, &body)
    }
}

/// Validate the service's answer and pull out the extracted JSON text.
///
/// Checks run in a fixed order: status code, body JSON-ness, block
/// signal vs. candidates, text presence, and finally object shape.
fn interpret_response(status: u16, body: &str) -> Result<String, ExtractError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.to_string());
        warn!(code = status, "Extraction service returned an error");
        return Err(ExtractError::Service {
            code: status,
            message,
        });
    }

    let parsed: Value =
        serde_json::from_str(body).map_err(|_| ExtractError::MalformedResponse)?;

    let text = parsed
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(text) = text else {
        if let Some(reason) = parsed
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            warn!(reason = %reason, "Extraction request was blocked");
            return Err(ExtractError::Blocked(reason.to_string()));
        }
        warn!("Extraction response missing candidate text");
        return Err(ExtractError::UnexpectedStructure(
            "missing or empty candidate text".to_string(),
        ));
    };

    if !text.starts_with('{') || !text.ends_with('}') {
        return Err(ExtractError::UnexpectedStructure(format!(
            "non-JSON candidate text: {}",
            excerpt(text, 100)
        )));
    }

    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate_body(text: &str) -> String {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] }
            }]
        })
        .to_string()
    }

    #[test]
    fn test_success_returns_trimmed_text() {
        let body = candidate_body("  {\"purpose\": \"Claude Pro\"}  ");
        let text = interpret_response(200, &body).unwrap();
        assert_eq!(text, "{\"purpose\": \"Claude Pro\"}");
    }

    #[test]
    fn test_non_2xx_extracts_error_message() {
        let body = json!({ "error": { "message": "quota exceeded" } }).to_string();
        let err = interpret_response(429, &body).unwrap_err();
        match err {
            ExtractError::Service { code, message } => {
                assert_eq!(code, 429);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected Service, got {other:?}"),
        }
    }

    #[test]
    fn test_non_2xx_with_plain_body_keeps_raw_body() {
        let err = interpret_response(500, "internal error").unwrap_err();
        match err {
            ExtractError::Service { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "internal error");
            }
            other => panic!("expected Service, got {other:?}"),
        }
    }

    #[test]
    fn test_2xx_non_json_body_is_malformed() {
        let err = interpret_response(200, "<html>oops</html>").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedResponse));
    }

    #[test]
    fn test_block_reason_wins_over_structure_error() {
        let body = json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })
        .to_string();
        let err = interpret_response(200, &body).unwrap_err();
        match err {
            ExtractError::Blocked(reason) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[test]
    fn test_neither_candidates_nor_block_is_unexpected() {
        let err = interpret_response(200, "{}").unwrap_err();
        assert!(matches!(err, ExtractError::UnexpectedStructure(_)));
    }

    #[test]
    fn test_empty_candidate_text_is_unexpected() {
        let body = candidate_body("   ");
        let err = interpret_response(200, &body).unwrap_err();
        assert!(matches!(err, ExtractError::UnexpectedStructure(_)));
    }

    #[test]
    fn test_non_object_candidate_text_is_unexpected() {
        let body = candidate_body("Sure! Here is the data you asked for.");
        let err = interpret_response(200, &body).unwrap_err();
        match err {
            ExtractError::UnexpectedStructure(msg) => {
                assert!(msg.contains("Sure!"), "msg: {msg}")
            }
            other => panic!("expected UnexpectedStructure, got {other:?}"),
        }
    }

    #[test]
    fn test_request_shape() {
        let client = GeminiClient::new("k".into(), "test-model".into());
        let request = client.build_request(b"%PDF-1.4");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "application/pdf"
        );
        assert_eq!(
            value["generationConfig"]["response_mime_type"],
            "application/json"
        );
        let props = &value["generationConfig"]["response_schema"]["properties"];
        for field in ["purpose", "date", "amount_str"] {
            assert_eq!(props[field]["nullable"], true, "field: {field}");
        }
    }
}
