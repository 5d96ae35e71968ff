// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scripted messaging client.

use async_trait::async_trait;
use classroom_alert_relay::line::{LineError, MessagingClient, OutgoingMessage};
use std::sync::Mutex;

/// Records every call; fails the first `broadcast_failures` broadcasts and,
/// optionally, every reply.
#[derive(Default)]
pub struct MockMessagingClient {
    broadcast_failures: u32,
    fail_replies: bool,
    pub broadcasts: Mutex<Vec<Vec<OutgoingMessage>>>,
    pub replies: Mutex<Vec<(String, Vec<OutgoingMessage>)>>,
}

impl MockMessagingClient {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing_first(n: u32) -> Self {
        Self {
            broadcast_failures: n,
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn failing_replies() -> Self {
        Self {
            fail_replies: true,
            ..Default::default()
        }
    }

    pub fn broadcast_calls(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingClient for MockMessagingClient {
    async fn broadcast(&self, messages: &[OutgoingMessage]) -> Result<(), LineError> {
        let mut broadcasts = self.broadcasts.lock().unwrap();
        broadcasts.push(messages.to_vec());
        if broadcasts.len() as u64 <= u64::from(self.broadcast_failures) {
            Err(LineError::Api {
                status: 500,
                body: "mock broadcast failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn reply(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<(), LineError> {
        self.replies
            .lock()
            .unwrap()
            .push((reply_token.to_string(), messages.to_vec()));
        if self.fail_replies {
            Err(LineError::Api {
                status: 400,
                body: "Invalid reply token".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
