// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for driving the relay router end to end.
//!
//! Provides a scripted messaging client, payload generators, and a helper
//! that wires a complete `AppState` into a temporary directory.

#![allow(dead_code)]

pub mod generators;
pub mod mock;

use axum::{body::Body, http::Response, Router};
use classroom_alert_relay::{config::Config, router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const CHANNEL_SECRET: &str = "test-channel-secret";

/// A router over a throwaway public directory.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub client: Arc<mock::MockMessagingClient>,
    pub dir: TempDir,
}

impl TestApp {
    /// Build with defaults, then let the caller adjust the config.
    pub async fn with_config(
        client: mock::MockMessagingClient,
        adjust: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::with_credentials(CHANNEL_SECRET, "test-token");
        config.public_dir = dir.path().join("public");
        config.static_dir = dir.path().join("static");
        // No outbound HEAD requests and no real backoff waits in tests
        config.probe.enabled = false;
        config.broadcast.backoff_step = Duration::ZERO;
        adjust(&mut config);

        let client = Arc::new(client);
        let state = Arc::new(AppState::new(config, client.clone()).unwrap());
        state.store.ensure_dirs().await.unwrap();

        Self {
            router: router(state.clone()),
            state,
            client,
            dir,
        }
    }

    pub async fn new(client: mock::MockMessagingClient) -> Self {
        Self::with_config(client, |_| {}).await
    }

    /// Names of the files currently in the uploads directory.
    pub fn uploaded_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.state.store.uploads_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Collect a response body into JSON.
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body into raw bytes.
pub async fn raw_body(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}
