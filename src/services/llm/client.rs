//! Analyst HTTP client
//!
//! Issues chat-completion requests against the configured endpoint. Two
//! wire dialects are supported: an Anthropic-style messages API (top-level
//! `system` string) and an OpenAI-style chat API (system/system/user
//! message list with a json_object response format).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::models::{AnalyzedVerdict, LLMError, LLMVerdict, TokenUsage};
use super::prompt;
use crate::config::{LlmConfig, LlmDialect, PromptMode};
use crate::models::profile::CompanyProfile;
use crate::models::program::Program;

pub struct LLMClient {
    http_client: Client,
    config: LlmConfig,
}

impl LLMClient {
    /// Build a client from configuration. Returns None when the analyst is
    /// disabled or no API key is configured; the orchestrator then runs
    /// rule-only searches.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        config.api_key.as_ref()?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Some(Self { http_client, config: config.clone() })
    }

    pub fn timeout_secs(&self) -> u64 {
        self.config.timeout_secs
    }

    fn prompt_base_tokens(&self) -> i64 {
        match self.config.prompt_mode {
            PromptMode::Standard => super::models::PROMPT_BASE_TOKENS_STANDARD,
            PromptMode::Compact => super::models::PROMPT_BASE_TOKENS_COMPACT,
        }
    }

    /// Analyze one (profile, program) pair into a structured verdict.
    pub async fn analyze(
        &self,
        profile: &CompanyProfile,
        program: &Program,
    ) -> Result<AnalyzedVerdict, LLMError> {
        let payload = prompt::build_user_payload(profile, program);
        let user_prompt = serde_json::to_string_pretty(&payload)?;

        let (content, reported_usage) = match self.config.dialect {
            LlmDialect::Anthropic => self.call_messages_api(&user_prompt).await?,
            LlmDialect::OpenAi => self.call_chat_api(&user_prompt).await?,
        };

        let usage = reported_usage.unwrap_or_else(|| {
            TokenUsage::estimate(self.prompt_base_tokens(), user_prompt.len(), content.len())
        });

        let verdict = parse_verdict(&content)?;
        Ok(AnalyzedVerdict { verdict, usage })
    }

    fn api_key(&self) -> &str {
        // Presence is checked in from_config.
        self.config.api_key.as_deref().unwrap_or_default()
    }

    fn map_send_error(&self, e: reqwest::Error) -> LLMError {
        if e.is_timeout() {
            LLMError::Timeout(self.config.timeout_secs)
        } else {
            LLMError::Transport(e.to_string())
        }
    }

    /// Anthropic-style dialect: top-level `system` string, single user
    /// message, `content: [{type: text, text}]` response.
    async fn call_messages_api(
        &self,
        user_prompt: &str,
    ) -> Result<(String, Option<TokenUsage>), LLMError> {
        let system = format!(
            "{}\n\n{}",
            prompt::persona(self.config.prompt_mode),
            prompt::DATA_GUARD_PROMPT
        );
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system,
            messages: vec![ChatMessage { role: "user".to_string(), content: user_prompt.to_string() }],
        };

        let url = format!("{}/v1/messages", self.config.api_base.trim_end_matches('/'));
        tracing::debug!("Calling analyst endpoint {} with model {}", url, self.config.model);

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", self.api_key())
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LLMError::Decode(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.clone());
            return Err(LLMError::Transport(format!("API error {}: {}", status, message)));
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| LLMError::Decode(e.to_string()))?;

        let content = parsed
            .content
            .iter()
            .find(|b| b.r#type == "text")
            .map(|b| b.text.clone())
            .ok_or_else(|| LLMError::Decode("Empty analyst response".to_string()))?;

        let usage = parsed.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });

        Ok((content, usage))
    }

    /// OpenAI-style dialect: system/system/user message list, json_object
    /// response format, `choices[0].message.content` response.
    async fn call_chat_api(
        &self,
        user_prompt: &str,
    ) -> Result<(String, Option<TokenUsage>), LLMError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt::persona(self.config.prompt_mode).to_string(),
                },
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt::DATA_GUARD_PROMPT.to_string(),
                },
                ChatMessage { role: "user".to_string(), content: user_prompt.to_string() },
            ],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            response_format: Some(ResponseFormat { r#type: "json_object".to_string() }),
        };

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        tracing::debug!("Calling analyst endpoint {} with model {}", url, self.config.model);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key()))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LLMError::Decode(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.clone());
            return Err(LLMError::Transport(format!("API error {}: {}", status, message)));
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| LLMError::Decode(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LLMError::Decode("Empty analyst response".to_string()))?;

        let usage = parsed.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok((content, usage))
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parse a verdict from analyst output. The JSON is located by, in order:
/// a fenced ```json block, any fenced block, the first balanced brace span.
pub fn parse_verdict(content: &str) -> Result<LLMVerdict, LLMError> {
    let json_text =
        extract_json(content).ok_or_else(|| LLMError::Decode("No JSON object in analyst response".to_string()))?;

    let value: serde_json::Value = serde_json::from_str(&json_text)
        .map_err(|e| LLMError::Decode(format!("Malformed JSON in analyst response: {}", e)))?;

    serde_json::from_value(value).map_err(|e| LLMError::Schema(e.to_string()))
}

fn extract_json(content: &str) -> Option<String> {
    if let Some(block) = extract_fenced(content, "```json") {
        return Some(block);
    }
    if let Some(block) = extract_fenced(content, "```") {
        return Some(block);
    }
    extract_balanced_braces(content)
}

fn extract_fenced(content: &str, fence: &str) -> Option<String> {
    let start = content.find(fence)? + fence.len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    let inner = rest[..end].trim();
    if inner.is_empty() { None } else { Some(inner.to_string()) }
}

/// First balanced `{...}` span, string-literal aware.
fn extract_balanced_braces(content: &str) -> Option<String> {
    let bytes = content.as_bytes();
    let start = content.find('{')?;
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
                    return Some(content[start..=i].to_string());
                }
            },
            _ => {},
        }
    }
    None
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: i64,
    output_tokens: i64,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"eligible": true, "confidence": "medium"}"#;

    #[test]
    fn test_parse_plain_json() {
        let v = parse_verdict(VALID).expect("parse");
        assert!(v.eligible);
    }

    #[test]
    fn test_parse_fenced_json_block() {
        let content = format!("Hier die Analyse:\n```json\n{}\n```\nEnde.", VALID);
        assert!(parse_verdict(&content).is_ok());
    }

    #[test]
    fn test_parse_unlabeled_fence() {
        let content = format!("```\n{}\n```", VALID);
        assert!(parse_verdict(&content).is_ok());
    }

    #[test]
    fn test_parse_balanced_braces_with_noise() {
        let content = format!("Das Ergebnis lautet {} und mehr Text danach", VALID);
        assert!(parse_verdict(&content).is_ok());
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let content = r#"{"eligible": true, "confidence": "low", "insiderTipp": "ein { im Text"}"#;
        let v = parse_verdict(content).expect("parse");
        assert_eq!(v.insider_tipp.as_deref(), Some("ein { im Text"));
    }

    #[test]
    fn test_missing_required_field_is_schema_error() {
        let content = r#"{"confidence": "high"}"#;
        match parse_verdict(content) {
            Err(LLMError::Schema(_)) => {},
            other => panic!("expected schema error, got {:?}", other.map(|v| v.eligible)),
        }
    }

    #[test]
    fn test_no_json_is_decode_error() {
        match parse_verdict("leider keine Antwort") {
            Err(LLMError::Decode(_)) => {},
            other => panic!("expected decode error, got {:?}", other.map(|v| v.eligible)),
        }
    }
}
