// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Classroom Alert Relay
//!
//! Accepts an image upload with classroom/time/message metadata, stores it,
//! and broadcasts an alert (image + text) to every follower of a LINE
//! channel:
//!
//! - Process-wide token bucket (10 req/s, burst 10)
//! - Byte-signature sniffing (JPEG, PNG, WebP only), 10 MiB limit
//! - Public image URLs from `BASE_URL` or the request origin
//! - Bounded broadcast retries with linear backoff (2s, 4s)
//! - LINE webhook with canned replies

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod line;
pub mod resolver;
pub mod sniff;
pub mod store;
pub mod upload;
pub mod webhook;

pub use config::Config;
pub use handlers::AppState;
pub use limiter::{RateLimitResult, RateLimiter};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

/// CORS policy for the configured origins.
pub fn cors_layer(allow_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allow_origins
        .iter()
        .filter_map(|o| o.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([header::CONTENT_LENGTH])
        .allow_credentials(true)
        .max_age(Duration::from_secs(12 * 60 * 60))
}

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let cors = cors_layer(&state.config.allow_origins);

    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route("/health", get(handlers::health))
        .route("/firebase-config", get(handlers::firebase_config))
        .route("/webhook", post(handlers::webhook))
        .route("/broadcast", post(handlers::broadcast))
        .route(
            "/api/record",
            // The handler enforces the upload limit while streaming
            post(handlers::record).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/public/{*path}",
            get(handlers::serve_public).head(handlers::serve_public),
        )
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(middleware::from_fn_with_state(state.clone(), handlers::rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
