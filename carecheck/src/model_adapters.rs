// carecheck/src/model_adapters.rs
//!
//! Model Adapters: the seam between the pipeline and the hosted LLM.
//!
//! Architecture:
//! - ModelAdapter trait: one request in, one text response out
//! - GoogleAdapter: Gemini `generateContent` over HTTPS
//! - GenerationError: failures classified into the categories a user can act on
//!
//! Tests and alternative providers plug in by implementing [`ModelAdapter`].

use crate::chat::{ChatMessage, ChatRole};
use crate::config::ModelSettings;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct LlmGeneration {
    pub response: String,
    pub usage: TokenUsage,
}

/// Everything one call to the model needs.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system_instruction: Option<String>,
    /// Conversation so far; a one-shot prompt is a single user message.
    pub contents: Vec<ChatMessage>,
    /// When set, the model is asked for JSON matching this schema.
    pub response_schema: Option<Value>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![ChatMessage::user(prompt)],
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    InvalidApiKey,
    QuotaExceeded,
    MalformedResponse,
    Unknown,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider} request failed ({kind:?}): {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub provider: &'static str,
    pub message: String,
}

impl GenerationError {
    pub fn new(
        kind: GenerationErrorKind,
        provider: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider,
            message: message.into(),
        }
    }

    /// Sentence shown to the user, chosen by failure category.
    pub fn user_message(&self) -> String {
        match self.kind {
            GenerationErrorKind::InvalidApiKey => {
                "API 키가 유효하지 않습니다. 키 설정을 확인해 주세요.".to_string()
            }
            GenerationErrorKind::QuotaExceeded => {
                "API 사용량 한도를 초과했습니다. 잠시 후 다시 시도해 주세요.".to_string()
            }
            GenerationErrorKind::MalformedResponse => {
                "AI 응답 형식이 올바르지 않습니다. 다시 시도해 주세요.".to_string()
            }
            GenerationErrorKind::Unknown => {
                format!("보고서 생성 중 알 수 없는 오류가 발생했습니다: {}", self.message)
            }
        }
    }

    /// Maps an HTTP failure to a category using the status code and the
    /// provider's error text.
    pub fn from_status(provider: &'static str, status: u16, message: String) -> Self {
        let lowered = message.to_lowercase();
        let kind = if status == 401
            || status == 403
            || lowered.contains("api key not valid")
            || lowered.contains("api_key_invalid")
        {
            GenerationErrorKind::InvalidApiKey
        } else if status == 429
            || lowered.contains("quota")
            || lowered.contains("resource_exhausted")
        {
            GenerationErrorKind::QuotaExceeded
        } else {
            GenerationErrorKind::Unknown
        };
        Self::new(kind, provider, format!("HTTP {}: {}", status, message))
    }
}

/// Model adapter trait - common interface for LLM providers
pub trait ModelAdapter: Send + Sync {
    /// Run one generation request and return the model's text.
    fn generate(&self, request: &GenerationRequest) -> Result<LlmGeneration, GenerationError>;

    /// Model identifier, for logs and saved reports.
    fn model_name(&self) -> &str;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

// ============================================================================
// Google Gemini Adapter
// ============================================================================

pub struct GoogleAdapter {
    api_key: String,
    settings: ModelSettings,
    agent: ureq::Agent,
}

impl GoogleAdapter {
    pub fn new(api_key: String, settings: ModelSettings) -> Self {
        let agent = ureq::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build();
        Self {
            api_key,
            settings,
            agent,
        }
    }

    fn payload(&self, request: &GenerationRequest) -> Value {
        let contents: Vec<Value> = request
            .contents
            .iter()
            .map(|message| {
                json!({
                    "role": match message.role {
                        ChatRole::User => "user",
                        ChatRole::Model => "model",
                    },
                    "parts": [{ "text": message.text }]
                })
            })
            .collect();

        let mut generation_config = json!({
            "temperature": request.temperature.unwrap_or(self.settings.temperature),
            "maxOutputTokens": self.settings.max_output_tokens,
        });
        if let Some(schema) = &request.response_schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema.clone();
        }

        let mut payload = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(instruction) = &request.system_instruction {
            payload["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
        }
        payload
    }

    fn parse_response(&self, response_json: &Value) -> Result<LlmGeneration, GenerationError> {
        if let Some(reason) = response_json["promptFeedback"]["blockReason"].as_str() {
            return Err(GenerationError::new(
                GenerationErrorKind::MalformedResponse,
                self.provider_name(),
                format!("prompt was blocked: {}", reason),
            ));
        }

        let parts = response_json["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                let finish = response_json["candidates"][0]["finishReason"]
                    .as_str()
                    .unwrap_or("none");
                GenerationError::new(
                    GenerationErrorKind::MalformedResponse,
                    self.provider_name(),
                    format!("no content in Gemini response (finishReason: {})", finish),
                )
            })?;

        let text = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<String>();

        let usage = TokenUsage {
            prompt_tokens: response_json["usageMetadata"]["promptTokenCount"]
                .as_u64()
                .unwrap_or(0),
            completion_tokens: response_json["usageMetadata"]["candidatesTokenCount"]
                .as_u64()
                .unwrap_or(0),
        };

        Ok(LlmGeneration {
            response: text,
            usage,
        })
    }
}

impl ModelAdapter for GoogleAdapter {
    fn generate(&self, request: &GenerationRequest) -> Result<LlmGeneration, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.name
        );
        debug!(
            model = %self.settings.name,
            turns = request.contents.len(),
            "sending Gemini request"
        );

        let response = self
            .agent
            .post(&url)
            .set("x-goog-api-key", &self.api_key)
            .set("Content-Type", "application/json")
            .send_json(self.payload(request));

        // Handle HTTP errors
        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let error_body: Result<Value, _> = resp.into_json();
                let error_msg = match error_body {
                    Ok(json) => json["error"]["message"]
                        .as_str()
                        .unwrap_or("Unknown API error")
                        .to_string(),
                    Err(_) => format!("HTTP {} error", code),
                };
                warn!(code, "Gemini API returned an error status");
                return Err(GenerationError::from_status(self.provider_name(), code, error_msg));
            }
            Err(e) => {
                return Err(GenerationError::new(
                    GenerationErrorKind::Unknown,
                    self.provider_name(),
                    format!("Failed to connect to Google Gemini API: {}", e),
                ));
            }
        };

        let response_json: Value = response.into_json().map_err(|e| {
            GenerationError::new(
                GenerationErrorKind::MalformedResponse,
                self.provider_name(),
                format!("Failed to parse Gemini API response: {}", e),
            )
        })?;

        self.parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.settings.name
    }

    fn provider_name(&self) -> &'static str {
        "Google Gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GoogleAdapter {
        GoogleAdapter::new("test-key".into(), ModelSettings::default())
    }

    #[test]
    fn test_payload_with_schema_and_history() {
        let request = GenerationRequest {
            system_instruction: Some("보고서만 근거로 답하세요".into()),
            contents: vec![
                ChatMessage::user("질문"),
                ChatMessage::model("답변"),
                ChatMessage::user("후속 질문"),
            ],
            response_schema: Some(json!({ "type": "OBJECT" })),
            temperature: Some(0.1),
        };

        let payload = adapter().payload(&request);
        assert_eq!(payload["contents"].as_array().unwrap().len(), 3);
        assert_eq!(payload["contents"][1]["role"], "model");
        assert_eq!(payload["contents"][2]["parts"][0]["text"], "후속 질문");
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(payload["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "보고서만 근거로 답하세요"
        );
    }

    #[test]
    fn test_plain_payload_has_no_schema() {
        let payload = adapter().payload(&GenerationRequest::prompt("hi"));
        assert!(payload["generationConfig"].get("responseSchema").is_none());
        assert!(payload.get("systemInstruction").is_none());
    }

    #[test]
    fn test_parse_response_joins_parts_and_reads_usage() -> Result<(), GenerationError> {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 120, "candidatesTokenCount": 30 }
        });

        let generation = adapter().parse_response(&body)?;
        assert_eq!(generation.response, "{\"a\":1}");
        assert_eq!(generation.usage.total(), 150);
        Ok(())
    }

    #[test]
    fn test_missing_candidates_is_malformed() {
        let err = adapter()
            .parse_response(&json!({ "candidates": [{ "finishReason": "SAFETY" }] }))
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::MalformedResponse);
        assert!(err.message.contains("SAFETY"));
    }

    #[test]
    fn test_status_classification() {
        let key = GenerationError::from_status(
            "p",
            400,
            "API key not valid. Please pass a valid API key.".into(),
        );
        assert_eq!(key.kind, GenerationErrorKind::InvalidApiKey);

        let quota = GenerationError::from_status("p", 429, "Resource has been exhausted".into());
        assert_eq!(quota.kind, GenerationErrorKind::QuotaExceeded);

        let other = GenerationError::from_status("p", 500, "internal".into());
        assert_eq!(other.kind, GenerationErrorKind::Unknown);
        assert!(other.user_message().contains("internal"));
    }
}
