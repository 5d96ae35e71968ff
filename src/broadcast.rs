// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Broadcast dispatcher.
//!
//! Composes the two-part alert (image + text block) and sends it through
//! the messaging client with a bounded retry loop:
//!
//! - at most `max_attempts` sends, each one atomic over both messages
//! - after failed attempt `n` (1-based) wait `backoff(n)`, except after the last
//! - linear backoff by default (`n * 2s`), no jitter
//!
//! Sleeping goes through [`Sleeper`] so the schedule can be tested without
//! waiting on a real clock.

use crate::config::BroadcastConfig;
use crate::line::{LineError, MessagingClient, OutgoingMessage};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `attempt * step`
    Linear { step: Duration },
    /// Same delay every time
    Constant(Duration),
    /// Retry immediately
    None,
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { step } => step * attempt,
            Backoff::Constant(delay) => delay,
            Backoff::None => Duration::ZERO,
        }
    }
}

/// Retry policy for a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear {
                step: Duration::from_secs(2),
            },
        }
    }
}

impl From<&BroadcastConfig> for RetryPolicy {
    fn from(config: &BroadcastConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::Linear {
                step: config.backoff_step,
            },
        }
    }
}

/// Something that can wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Waits on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Everything needed to compose one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPayload {
    pub image_url: String,
    pub preview_image_url: String,
    pub message: String,
    pub classroom: String,
    pub time: String,
}

/// All attempts failed.
#[derive(Debug, Error)]
#[error("Broadcast failed after {attempts} attempts: {last_error}")]
pub struct BroadcastError {
    pub attempts: u32,
    #[source]
    pub last_error: LineError,
}

/// Build the alert text block.
pub fn alert_text(payload: &BroadcastPayload, date: NaiveDate) -> String {
    format!(
        "🚨 แจ้งเตือน: {}\n\
         \n\
         🏫 สถานที่: {}\n\
         ⏰ เวลา: {}\n\
         📅 วันที่: {}\n\
         ━━━━━━━━━━━━━━━━━━━━━━━━━\n\
         🤖 แจ้งเตือนอัตโนมัติจากระบบ",
        payload.message,
        payload.classroom,
        payload.time,
        date.format("%d/%m/%Y"),
    )
}

/// The image message followed by the text block.
pub fn compose_messages(payload: &BroadcastPayload, date: NaiveDate) -> Vec<OutgoingMessage> {
    vec![
        OutgoingMessage::image(&payload.image_url, &payload.preview_image_url),
        OutgoingMessage::text(alert_text(payload, date)),
    ]
}

/// Sends alerts with retries.
pub struct Dispatcher {
    client: Arc<dyn MessagingClient>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn MessagingClient>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(client, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        client: Arc<dyn MessagingClient>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            client,
            policy,
            sleeper,
        }
    }

    /// Broadcast an alert dated today (local time).
    pub async fn dispatch(&self, payload: &BroadcastPayload) -> Result<u32, BroadcastError> {
        self.dispatch_on(payload, chrono::Local::now().date_naive()).await
    }

    /// Broadcast an alert with an explicit date. Returns the attempt that
    /// succeeded.
    pub async fn dispatch_on(
        &self,
        payload: &BroadcastPayload,
        date: NaiveDate,
    ) -> Result<u32, BroadcastError> {
        let messages = compose_messages(payload, date);
        let max_attempts = self.policy.max_attempts.max(1);

        info!(
            messages = messages.len(),
            classroom = %payload.classroom,
            image_url = %payload.image_url,
            "Broadcasting alert"
        );

        let mut attempt = 1;
        loop {
            match self.client.broadcast(&messages).await {
                Ok(()) => {
                    info!(attempt, "Broadcast sent");
                    return Ok(attempt);
                }
                Err(err) if attempt >= max_attempts => {
                    error!(attempt, error = %err, "All broadcast attempts failed");
                    return Err(BroadcastError {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.backoff.delay(attempt);
                    warn!(attempt, error = %err, ?delay, "Broadcast attempt failed, retrying");
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
