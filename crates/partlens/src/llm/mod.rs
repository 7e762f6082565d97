//! Language-model inference capability.
//!
//! Used for heuristic OEM guessing, semantic part-match filtering, and
//! optional grounded verification. Modeled as `complete(prompt, json_mode)`;
//! quota and timeout surface as `InferenceError` and every caller has a
//! conservative non-LLM fallback.

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use crate::error::InferenceError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt. With `json_mode` the model is instructed to emit a
    /// single JSON object and nothing else.
    async fn complete(&self, prompt: &str, json_mode: bool) -> Result<String, InferenceError>;
}

/// External OpenAI-compatible chat-completions provider.
pub struct HttpLlmClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Parse a response body as JSON, with a clear error when the server
    /// returned HTML (proxy error pages, login walls).
    fn parse_body(body: &str, endpoint: &str) -> Result<JsonValue, InferenceError> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(120).collect();
            return Err(InferenceError::Backend(anyhow!(
                "endpoint {} returned HTML instead of JSON: {}",
                endpoint,
                preview
            )
            .to_string()));
        }
        serde_json::from_str(body).map_err(|e| InferenceError::Backend(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str, json_mode: bool) -> Result<String, InferenceError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.1,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else {
                    InferenceError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(InferenceError::Quota);
        }
        let text = response
            .text()
            .await
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        if !status.is_success() {
            return Err(InferenceError::Backend(format!(
                "HTTP {} from {}: {}",
                status,
                self.endpoint,
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed = Self::parse_body(&text, &self.endpoint)?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| InferenceError::Backend("response had no message content".into()))
    }
}

/// Extract the first JSON object from model output that may be wrapped in
/// prose or code fences. Models in json_mode still occasionally decorate.
pub fn extract_json_object(text: &str) -> Option<JsonValue> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let slice = &text[start..start + offset + ch.len_utf8()];
                    return serde_json::from_str(slice).ok();
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
    fn test_extract_json_object_from_fenced_output() {
        let text = "Here you go:\n```json\n{\"oem\": \"5Q0615301F\", \"confidence\": 0.6}\n```";
        let value = extract_json_object(text).expect("object extracted");
        assert_eq!(value["oem"], "5Q0615301F");
    }

    #[test]
    fn test_extract_json_object_handles_nested_and_strings() {
        let text = r#"{"a": {"b": "brace } in string"}, "c": 1} trailing"#;
        let value = extract_json_object(text).expect("object extracted");
        assert_eq!(value["c"], 1);
    }

    #[test]
    fn test_extract_json_object_none_on_garbage() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{unbalanced").is_none());
    }

    #[test]
    fn test_html_body_rejected() {
        let err = HttpLlmClient::parse_body("<html><body>502</body></html>", "http://x")
            .expect_err("html must be rejected");
        assert!(matches!(err, InferenceError::Backend(_)));
    }
}
