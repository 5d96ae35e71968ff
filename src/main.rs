// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Classroom Alert Relay Service
//!
//! Receives captured images from the web client, publishes them under
//! `/public/uploads/`, and broadcasts an alert to the LINE channel.
//!
//! ## Configuration
//!
//! Environment variables (a `.env` file is loaded first when present):
//!
//! - `CHANNEL_SECRET`, `CHANNEL_TOKEN`: LINE credentials (required)
//! - `PORT`: Listen port (default: 8080)
//! - `BASE_URL`: External base URL for image links (default: request host)
//! - `ALLOW_ORIGINS`: Comma-separated CORS origins
//! - `FIREBASE_*`: Values returned by `/firebase-config`

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use classroom_alert_relay::{config::Config, line::LineClient, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before tracing so RUST_LOG can come from .env
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if let Err(err) = dotenv {
        warn!(error = %err, "No .env file loaded");
    }

    // Load configuration
    let config = Config::from_env().context("Invalid configuration")?;
    if config.base_url.is_none() {
        warn!("BASE_URL not set; image URLs will use the request host");
    }

    let line = LineClient::new(&config.line).context("Failed to create LINE client")?;
    let state = Arc::new(
        AppState::new(config.clone(), Arc::new(line)).context("Failed to build HTTP clients")?,
    );

    state
        .store
        .ensure_dirs()
        .await
        .context("Failed to create upload folder")?;

    let uploads_dir = state.store.uploads_dir();
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        base_url = ?config.base_url,
        uploads = %uploads_dir.display(),
        allow_origins = ?config.allow_origins,
        "Server listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
