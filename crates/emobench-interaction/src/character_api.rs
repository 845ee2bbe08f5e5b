//! REST client for the roleplay character backend.
//!
//! Production implementation of [`CharacterBackend`]. The backend hosts
//! the characters under test; sessions are opened per seed-topic
//! conversation and messages exchange plain text. Server-side failures
//! (5xx, 429, connection problems) surface as transient backend errors so
//! the orchestrator's retry policy can take one more shot.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use emobench_core::{CharacterBackend, CharacterSession, EmobenchError, Result};

/// Client for the character-hosting chat service.
#[derive(Clone)]
pub struct CharacterApiClient {
    client: Client,
    base_url: String,
    token: String,
    user_id: String,
}

impl CharacterApiClient {
    /// Authenticates against the backend and resolves the account's user
    /// id. Fails fast on bad credentials.
    pub async fn connect(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let client = Client::new();

        let me: UserResponse = request_json(
            client
                .get(format!("{base_url}/users/me"))
                .header("Authorization", format!("Token {token}")),
        )
        .await?;

        Ok(Self {
            client,
            base_url,
            token,
            user_id: me.id,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Token {}", self.token))
    }
}

#[async_trait]
impl CharacterBackend for CharacterApiClient {
    async fn new_chat(&self, character_id: &str) -> Result<CharacterSession> {
        let response: NewChatResponse = request_json(self.authorized(
            self.client
                .post(format!("{}/chats", self.base_url))
                .json(&NewChatRequest {
                    character_id,
                    user_id: &self.user_id,
                }),
        ))
        .await?;

        Ok(CharacterSession {
            chat_id: response.chat_id,
            greeting: response.greeting,
        })
    }

    async fn send_message(&self, character_id: &str, chat_id: &str, text: &str) -> Result<String> {
        let response: MessageResponse = request_json(self.authorized(
            self.client
                .post(format!("{}/chats/{chat_id}/messages", self.base_url))
                .json(&MessageRequest { character_id, text }),
        ))
        .await?;

        Ok(response.text)
    }
}

async fn request_json<T: serde::de::DeserializeOwned>(
    builder: reqwest::RequestBuilder,
) -> Result<T> {
    let response = builder.send().await.map_err(|err| EmobenchError::Backend {
        message: format!("character backend request failed: {err}"),
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

    response.json().await.map_err(|err| {
        EmobenchError::backend(format!("failed to parse character backend response: {err}"))
    })
}

fn map_http_error(status: StatusCode, body: String) -> EmobenchError {
    let transient = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
    EmobenchError::Backend {
        message: format!("character backend returned {status}: {body}"),
        transient,
    }
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
}

#[derive(Serialize)]
struct NewChatRequest<'a> {
    character_id: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct NewChatResponse {
    chat_id: String,
    #[serde(default)]
    greeting: Option<String>,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    character_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_side_failures_are_transient() {
        assert!(map_http_error(StatusCode::INTERNAL_SERVER_ERROR, String::new()).is_retryable());
        assert!(map_http_error(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(!map_http_error(StatusCode::NOT_FOUND, String::new()).is_retryable());
    }
}
