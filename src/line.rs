// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! LINE Messaging API client.
//!
//! Only the calls the relay needs: broadcast to all followers and reply to
//! a webhook event. Handlers depend on the [`MessagingClient`] trait so the
//! platform can be swapped for a mock in tests.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::LineConfig;

/// Messaging API errors.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("Channel secret and access token must not be empty")]
    MissingCredentials,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LINE API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// An outgoing message object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        original_content_url: String,
        preview_image_url: String,
    },
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(original_content_url: impl Into<String>, preview_image_url: impl Into<String>) -> Self {
        Self::Image {
            original_content_url: original_content_url.into(),
            preview_image_url: preview_image_url.into(),
        }
    }
}

/// Operations the relay needs from the messaging platform.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Send `messages` to every follower as one request.
    async fn broadcast(&self, messages: &[OutgoingMessage]) -> Result<(), LineError>;

    /// Answer a webhook event.
    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<(), LineError>;
}

#[derive(Serialize)]
struct BroadcastBody<'a> {
    messages: &'a [OutgoingMessage],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody<'a> {
    reply_token: &'a str,
    messages: &'a [OutgoingMessage],
}

/// HTTPS client for the LINE Messaging API.
pub struct LineClient {
    api_base: String,
    channel_token: String,
    client: reqwest::Client,
}

impl LineClient {
    /// Build a client. Fails on empty credentials.
    pub fn new(config: &LineConfig) -> Result<Self, LineError> {
        if config.channel_secret.is_empty() || config.channel_token.is_empty() {
            return Err(LineError::MissingCredentials);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            channel_token: config.channel_token.clone(),
            client,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), LineError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(%url, "Calling LINE API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.channel_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(LineError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl MessagingClient for LineClient {
    async fn broadcast(&self, messages: &[OutgoingMessage]) -> Result<(), LineError> {
        self.post("/v2/bot/message/broadcast", &BroadcastBody { messages })
            .await
    }

    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<(), LineError> {
        self.post(
            "/v2/bot/message/reply",
            &ReplyBody {
                reply_token,
                messages,
            },
        )
        .await
    }
}
