//! 基于 Gemini `generateContent` 接口的翻译客户端

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{RequestContext, TranslationClient};
use crate::translation::config::constants;
use crate::translation::error::{classify_failure, TranslationError, TranslationResult};

/// Gemini 翻译客户端
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new(constants::DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl TranslationClient for GeminiClient {
    async fn translate(&self, context: &RequestContext, text: &str) -> TranslationResult<String> {
        if !context.has_credential() {
            return Err(TranslationError::MissingCredential);
        }

        let body = build_request_body(&context.target_language, text);
        let response = self
            .http
            .post(self.url(&context.model))
            .header("x-goog-api-key", &context.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload = response.text().await?;

        if !status.is_success() {
            let message = extract_error_message(&payload).unwrap_or(payload);
            tracing::debug!("翻译接口返回 {}: {}", status, message);
            return Err(classify_failure(Some(status.as_u16()), &message));
        }

        let value: Value = serde_json::from_str(&payload)?;
        extract_translated_text(&value)
    }
}

/// 构造翻译提示
pub fn build_prompt(target_language: &str, text: &str) -> String {
    format!(
        "Translate the following text into {lang}. \
         Each item starts with a marker like [[0]]; keep every marker unchanged \
         at the start of its item and do not merge, drop or reorder items. \
         Copy backslash-escaped markers such as \\[[1]] verbatim. \
         Reply with the translation only.\n\n{text}",
        lang = target_language,
        text = text
    )
}

fn build_request_body(target_language: &str, text: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": build_prompt(target_language, text) }]
        }],
        "generationConfig": { "temperature": 0.2 }
    })
}

/// 从响应中取出译文，缺少文本字段时返回 `MalformedResponse`
pub fn extract_translated_text(value: &Value) -> TranslationResult<String> {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = value
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("缺少 candidates[0].content.parts");
            TranslationError::MalformedResponse(reason.to_string())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(TranslationError::MalformedResponse("响应中没有译文".to_string()));
    }

    Ok(text)
}

/// 解析错误响应 `{"error": {"status": ..., "message": ...}}`
fn extract_error_message(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let error = value.get("error")?;
    let message = error.get("message").and_then(Value::as_str).unwrap_or_default();
    match error.get("status").and_then(Value::as_str) {
        Some(status) => Some(format!("{}: {}", status, message)),
        None => Some(message.to_string()),
    }
}
