//! OpenAI-compatible chat-completions client.
//!
//! Production implementation of [`CompletionBackend`] used for the base
//! model behind the patient agent and the topic judge. Configuration
//! priority: explicit settings > environment variables.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;

use emobench_core::{ChatTurn, CompletionBackend, EmobenchError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiCompletionClient {
    client: Client,
    api_key: String,
    base_url: String,
    temperature: Option<f32>,
    top_p: Option<f32>,
}

impl OpenAiCompletionClient {
    /// Creates a new client with the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
            top_p: None,
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    pub fn try_from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            EmobenchError::config("OPENAI_API_KEY not found in the environment")
        })?;
        Ok(Self::new(api_key))
    }

    /// Overrides the endpoint (for OpenAI-compatible gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fixes the sampling temperature for every request.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Fixes nucleus sampling for every request.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompletionClient {
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String> {
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| EmobenchError::Backend {
                message: format!("completion request failed: {err}"),
                transient: err.is_connect() || err.is_timeout(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(map_http_error(status, body));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            EmobenchError::backend(format!("failed to parse completion response: {err}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EmobenchError::backend("completion returned no content"))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn map_http_error(status: StatusCode, body: String) -> EmobenchError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    let transient = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    EmobenchError::Backend {
        message: format!("completion endpoint returned {status}: {message}"),
        transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = map_http_error(StatusCode::BAD_GATEWAY, "upstream died".into());
        assert!(err.is_retryable());

        let err = map_http_error(StatusCode::UNAUTHORIZED, "bad key".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn request_serializes_openai_wire_shape() {
        let messages = vec![ChatTurn::system("profile"), ChatTurn::user("hello")];
        let request = ChatCompletionRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: Some(0.0),
            top_p: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!(json.get("top_p").is_none());
    }
}
