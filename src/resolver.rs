// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Public URL resolution for stored images, plus the advisory
//! reachability probe.

use axum::http::{header, HeaderMap, StatusCode, Uri};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ProbeConfig;

/// Route prefix under which uploads are served.
pub const PUBLIC_UPLOADS_PREFIX: &str = "/public/uploads/";

/// The parts of an inbound request that decide its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub https: bool,
    pub host: String,
}

impl RequestOrigin {
    /// Scheme from the URI or `X-Forwarded-Proto`, host from `Host` or the URI.
    pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Self {
        let forwarded_https = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("https"))
            .unwrap_or(false);
        let https = forwarded_https || uri.scheme_str() == Some("https");

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Self { https, host }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{scheme}://{}", self.host)
    }
}

/// Build the public URL for an uploaded file.
pub fn resolve_image_url(base_url: Option<&str>, origin: &RequestOrigin, filename: &str) -> String {
    let base = match base_url {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => origin.base_url(),
    };
    format!("{base}{PUBLIC_UPLOADS_PREFIX}{filename}")
}

/// Probe failures.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("status {0}")]
    Status(StatusCode),
}

/// Issues a HEAD request against freshly published URLs.
///
/// The result is only ever logged.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    config: ProbeConfig,
    client: reqwest::Client,
}

impl ReachabilityProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// HEAD the URL; anything but 200 is a failure.
    pub async fn check(&self, url: &str) -> Result<(), ProbeError> {
        let response = self.client.head(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ProbeError::Status(status)),
        }
    }

    /// Wait out the settle delay, probe, and log the outcome.
    pub async fn probe_and_log(&self, url: &str) {
        if !self.config.enabled {
            return;
        }

        tokio::time::sleep(self.config.settle_delay).await;
        match self.check(url).await {
            Ok(()) => info!(%url, "Image URL accessible"),
            Err(err) => warn!(%url, error = %err, "Image URL test failed"),
        }
    }
}
