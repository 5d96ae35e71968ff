// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the HTTP surface.

use crate::broadcast::BroadcastError;
use crate::store::StoreError;
use crate::upload::UploadError;
use crate::webhook::WebhookError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Server configuration is incomplete.")]
    ConfigIncomplete,

    #[error("Failed to broadcast message")]
    BroadcastFailed(#[source] BroadcastError),

    #[error("Not found")]
    NotFound,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Upload(_) | Self::InvalidBody(_) | Self::Webhook(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::ConfigIncomplete | Self::BroadcastFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, source = ?std::error::Error::source(&self), "Request failed");
        } else {
            warn!(error = %self, "Request rejected");
        }

        let body = match &self {
            Self::NotFound => return status.into_response(),
            Self::InvalidBody(details) => json!({
                "error": "Invalid request body",
                "details": details,
            }),
            // Paths and OS errors stay in the log
            Self::Store(_) => json!({ "error": "Failed to save file" }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
