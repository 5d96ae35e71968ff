// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Inbound LINE webhook events.
//!
//! The request body is authenticated with `X-Line-Signature`, the base64
//! HMAC-SHA256 of the raw body keyed by the channel secret. Text messages
//! and follows get canned replies; everything else is logged and dropped.

use crate::line::{MessagingClient, OutgoingMessage};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Reasons an inbound batch is rejected.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid request body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Webhook request body.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<Event>,
}

/// A webhook event. Only the kinds the relay reacts to are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    Message {
        #[serde(default)]
        reply_token: Option<String>,
        message: EventMessage,
    },
    #[serde(rename_all = "camelCase")]
    Follow {
        #[serde(default)]
        reply_token: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Message content of a message event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventMessage {
    Text {
        #[serde(default)]
        id: Option<String>,
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Sign a body the way the platform does.
pub fn sign(channel_secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Checks signatures and parses event batches.
#[derive(Clone)]
pub struct WebhookVerifier {
    channel_secret: String,
}

impl WebhookVerifier {
    pub fn new(channel_secret: impl Into<String>) -> Self {
        Self {
            channel_secret: channel_secret.into(),
        }
    }

    /// Verify the signature, then parse the batch.
    pub fn parse(&self, signature: Option<&str>, body: &[u8]) -> Result<Vec<Event>, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        let expected = BASE64_STANDARD
            .decode(signature.trim())
            .map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.channel_secret.as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(body);
        // Constant-time comparison
        mac.verify_slice(&expected)
            .map_err(|_| WebhookError::InvalidSignature)?;

        let parsed: WebhookBody = serde_json::from_slice(body)?;
        debug!(
            destination = ?parsed.destination,
            events = parsed.events.len(),
            "Webhook batch parsed"
        );
        Ok(parsed.events)
    }
}

/// Reply text for an incoming text message.
pub fn acknowledgement(text: &str) -> String {
    format!("สวัสดี! รับข้อความแล้ว: {text}")
}

/// Reply text for a new follower.
pub const WELCOME_TEXT: &str = "ยินดีต้อนรับ! \nระบบพร้อมส่งการแจ้งเตือนให้คุณแล้ว";

/// Counts of what happened to a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandledEvents {
    pub replied: usize,
    pub failed: usize,
    pub ignored: usize,
}

/// Answer each event. Reply failures are logged, never returned.
pub async fn handle_events(client: &dyn MessagingClient, events: &[Event]) -> HandledEvents {
    let mut summary = HandledEvents::default();

    for event in events {
        let (reply_token, reply, kind) = match event {
            Event::Message {
                reply_token,
                message: EventMessage::Text { text, .. },
            } => (reply_token, acknowledgement(text), "message"),
            Event::Follow { reply_token } => (reply_token, WELCOME_TEXT.to_string(), "follow"),
            Event::Message { .. } => {
                info!(event = "message", "Non-text message ignored");
                summary.ignored += 1;
                continue;
            }
            Event::Other => {
                info!("Unhandled webhook event ignored");
                summary.ignored += 1;
                continue;
            }
        };

        info!(event = kind, "LINE event received");

        let Some(token) = reply_token.as_deref() else {
            warn!(event = kind, "Event has no reply token, skipping reply");
            summary.ignored += 1;
            continue;
        };

        match client.reply(token, &[OutgoingMessage::text(reply)]).await {
            Ok(()) => summary.replied += 1,
            Err(err) => {
                warn!(event = kind, error = %err, "Reply failed");
                summary.failed += 1;
            }
        }
    }

    summary
}
