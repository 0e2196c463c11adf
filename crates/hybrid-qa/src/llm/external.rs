//! OpenAI-compatible chat completions provider
//! Works against OpenAI, Ollama, vLLM and any other `/chat/completions` endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{GenerationConfig, LLMProvider, ProviderInfo};
use crate::config::LlmSettings;
use crate::error::{QaError, Result};

/// External API provider
pub struct ExternalProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
}

impl ExternalProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        let client = build_http_client()?;

        tracing::info!(model = %model, base_url = %base_url, "Creating ExternalProvider");

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Self::new(
            settings.api_key.clone(),
            settings.base_url.clone(),
            settings.model.clone(),
        )
    }

    fn get_endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Shared client settings for every outbound model call.
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(300))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| QaError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Send a JSON request with bearer auth and decode the JSON reply.
pub(crate) async fn post_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<T> {
    let response = client
        .post(endpoint)
        .header("Authorization", format!("Bearer {}", api_key))
        .json(body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                QaError::ExternalCall(format!(
                    "Request to {} timed out; check network connectivity",
                    endpoint
                ))
            } else if e.is_connect() {
                QaError::ExternalCall(format!(
                    "Failed to connect to {}: check network/firewall/proxy: {}",
                    endpoint, e
                ))
            } else {
                QaError::ExternalCall(format!("Request to {} failed: {}", endpoint, e))
            }
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        QaError::ExternalCall(format!("Failed to read response body from {}: {}", endpoint, e))
    })?;
    decode_json_body(status, &body, endpoint)
}

/// Parse a response body as JSON, returning a clear error if the server returned
/// an error status or an HTML page instead of JSON.
pub(crate) fn decode_json_body<T: serde::de::DeserializeOwned>(
    status: StatusCode,
    body: &str,
    endpoint: &str,
) -> Result<T> {
    if !status.is_success() {
        let preview: String = body.chars().take(300).collect();
        return Err(QaError::ExternalCall(format!(
            "API error from {} ({}): {}",
            endpoint, status, preview
        )));
    }

    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(QaError::ExternalCall(format!(
            "Endpoint {} returned HTML instead of JSON (HTTP {}); service may be down. Response: {}",
            endpoint, status, preview
        )));
    }

    serde_json::from_str::<T>(body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        QaError::ExternalCall(format!(
            "Failed to parse JSON from {} (HTTP {}): {}. Body: {}",
            endpoint, status, e, preview
        ))
    })
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let endpoint = self.get_endpoint();
        let mut request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "stream": false
        });
        if !config.stop_sequences.is_empty() {
            request["stop"] = json!(config.stop_sequences);
        }

        let start = std::time::Instant::now();
        let result: OpenAIResponse =
            post_json(&self.client, &endpoint, &self.api_key, &request).await?;

        tracing::debug!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished"
        );

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| QaError::ExternalCall("Chat completion returned no choices".into()))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "openai-compatible".to_string(),
            model: self.model.clone(),
            endpoint: self.get_endpoint(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chat_completion() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"sql"}}]}"#;
        let parsed: OpenAIResponse = decode_json_body(StatusCode::OK, body, "test").unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("sql"));
    }

    #[test]
    fn test_html_body_is_external_call_error() {
        let err = decode_json_body::<OpenAIResponse>(
            StatusCode::OK,
            "<!DOCTYPE html><html>Bad gateway</html>",
            "https://example.invalid/v1/chat/completions",
        )
        .unwrap_err();
        assert!(matches!(err, QaError::ExternalCall(_)));
        assert!(err.to_string().contains("HTML instead of JSON"));
    }

    #[test]
    fn test_error_status_is_external_call_error() {
        let err = decode_json_body::<OpenAIResponse>(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key"}}"#,
            "endpoint",
        )
        .unwrap_err();
        assert!(matches!(err, QaError::ExternalCall(_)));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let provider = ExternalProvider::new(
            "sk-test".into(),
            "http://localhost:11434/v1/".into(),
            "llama3".into(),
        )
        .unwrap();
        assert_eq!(
            provider.info().endpoint,
            "http://localhost:11434/v1/chat/completions"
        );
    }
}
