// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the alert relay.

use crate::broadcast::{BroadcastPayload, Dispatcher, RetryPolicy};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::line::MessagingClient;
use crate::resolver::{resolve_image_url, ReachabilityProbe, RequestOrigin};
use crate::store::FileStore;
use crate::upload::{generate_filename, AlertDetails, UploadError, UploadValidator};
use crate::webhook::{handle_events, WebhookVerifier, SIGNATURE_HEADER};
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
        Multipart, Path, Request, State,
    },
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub limiter: RateLimiter,
    pub validator: UploadValidator,
    pub store: FileStore,
    pub probe: ReachabilityProbe,
    pub messaging: Arc<dyn MessagingClient>,
    pub dispatcher: Dispatcher,
    pub webhook: WebhookVerifier,
}

impl AppState {
    /// Wire every dependency from the configuration and a messaging client.
    pub fn new(config: Config, messaging: Arc<dyn MessagingClient>) -> std::result::Result<Self, reqwest::Error> {
        Ok(Self {
            limiter: RateLimiter::new(config.rate_limit.clone()),
            validator: UploadValidator::new(config.upload.clone()),
            store: FileStore::new(&config.public_dir),
            probe: ReachabilityProbe::new(config.probe.clone())?,
            dispatcher: Dispatcher::new(messaging.clone(), RetryPolicy::from(&config.broadcast)),
            webhook: WebhookVerifier::new(config.line.channel_secret.clone()),
            messaging,
            config,
        })
    }
}

/// Endpoints listed by `/health`.
const ENDPOINTS: &[&str] = &[
    "GET / - Web interface",
    "POST /api/record - Upload an image and broadcast an alert",
    "POST /broadcast - Broadcast an alert for an existing image URL",
    "POST /webhook - LINE webhook",
    "GET /health - Health check",
];

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub base_url: Option<String>,
    pub endpoints: &'static [&'static str],
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Local::now().to_rfc3339(),
        base_url: state.config.base_url.clone(),
        endpoints: ENDPOINTS,
    })
}

/// Web-client Firebase settings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfigResponse {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    pub measurement_id: String,
}

/// Hand the Firebase settings to the web client.
pub async fn firebase_config(State(state): State<Arc<AppState>>) -> Result<Json<FirebaseConfigResponse>> {
    let fb = &state.config.firebase;
    let (Some(api_key), Some(auth_domain), Some(project_id)) =
        (&fb.api_key, &fb.auth_domain, &fb.project_id)
    else {
        warn!("Missing required Firebase environment variables");
        return Err(AppError::ConfigIncomplete);
    };

    let or_empty = |v: &Option<String>| v.clone().unwrap_or_default();
    Ok(Json(FirebaseConfigResponse {
        api_key: api_key.clone(),
        auth_domain: auth_domain.clone(),
        project_id: project_id.clone(),
        storage_bucket: or_empty(&fb.storage_bucket),
        messaging_sender_id: or_empty(&fb.messaging_sender_id),
        app_id: or_empty(&fb.app_id),
        measurement_id: or_empty(&fb.measurement_id),
    }))
}

/// Inbound LINE events.
///
/// Once the batch is authenticated and parsed the answer is always 200;
/// reply failures only show up in the log.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let events = state.webhook.parse(signature, &body)?;

    let summary = handle_events(state.messaging.as_ref(), &events).await;
    info!(
        events = events.len(),
        replied = summary.replied,
        failed = summary.failed,
        ignored = summary.ignored,
        "Webhook batch handled"
    );

    Ok(Json(json!({ "status": "ok" })))
}

/// Manual broadcast request.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub image_url: String,
    pub preview_image_url: String,
    pub message: String,
    pub classroom: String,
    pub overuse_time: String,
}

impl BroadcastRequest {
    /// First required field that is blank, if any.
    fn blank_field(&self) -> Option<&'static str> {
        [
            ("image_url", &self.image_url),
            ("preview_image_url", &self.preview_image_url),
            ("message", &self.message),
            ("classroom", &self.classroom),
            ("overuse_time", &self.overuse_time),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Broadcast an alert for an image that is already published.
pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    request: std::result::Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(req) = request.map_err(|rejection| AppError::InvalidBody(rejection.body_text()))?;
    if let Some(field) = req.blank_field() {
        return Err(AppError::InvalidBody(format!("{field} is required")));
    }

    let payload = BroadcastPayload {
        image_url: req.image_url,
        preview_image_url: req.preview_image_url,
        message: req.message,
        classroom: req.classroom,
        time: req.overuse_time,
    };

    state
        .dispatcher
        .dispatch(&payload)
        .await
        .map_err(AppError::BroadcastFailed)?;

    Ok(Json(json!({
        "status": "success",
        "message": "Broadcast sent successfully",
    })))
}

/// Response for `/api/record`.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub ok: bool,
    pub image_url: String,
    pub time: String,
    pub classroom: String,
    pub message: String,
    pub filename: String,
    pub broadcast_sent: bool,
    pub file_size_kb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Warning attached when the upload worked but the broadcast did not.
pub const BROADCAST_FAILED_WARNING: &str = "Image uploaded but broadcast failed";

struct ImageField {
    original_name: Option<String>,
    data: Vec<u8>,
}

#[derive(Default)]
struct RecordForm {
    image: Option<ImageField>,
    time: Option<String>,
    classroom: Option<String>,
    message: Option<String>,
}

fn malformed(err: MultipartError) -> UploadError {
    UploadError::Malformed(err.body_text())
}

/// Read a text field, stopping as soon as it exceeds the per-field limit.
async fn read_text_field(
    field: &mut Field<'_>,
    name: &'static str,
    validator: &UploadValidator,
) -> std::result::Result<String, UploadError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
        validator.check_field_size(name, data.len() + chunk.len())?;
        data.extend_from_slice(&chunk);
    }
    String::from_utf8(data).map_err(|_| UploadError::Malformed(format!("{name} is not valid UTF-8")))
}

/// Stream the multipart body, stopping as soon as any field exceeds its limit.
async fn read_record_form(
    mut multipart: Multipart,
    validator: &UploadValidator,
) -> std::result::Result<RecordForm, UploadError> {
    let mut form = RecordForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let original_name = field.file_name().map(str::to_string);
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(malformed)? {
                    validator.check_size(data.len() + chunk.len())?;
                    data.extend_from_slice(&chunk);
                }
                form.image = Some(ImageField { original_name, data });
            }
            Some("time") => form.time = Some(read_text_field(&mut field, "time", validator).await?),
            Some("classroom") => {
                form.classroom = Some(read_text_field(&mut field, "classroom", validator).await?)
            }
            Some("message") => {
                form.message = Some(read_text_field(&mut field, "message", validator).await?)
            }
            other => debug!(field = ?other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// Upload an image and broadcast the alert.
///
/// The upload result is reported independently of the broadcast: a failed
/// broadcast still answers 200, with `broadcast_sent: false` and a warning.
pub async fn record(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<RecordResponse>> {
    let form = read_record_form(multipart, &state.validator).await?;
    let image = form.image.ok_or(UploadError::MissingFile)?;

    let now = chrono::Local::now();
    let details = AlertDetails::from_form(form.time, form.classroom, form.message, &now);
    let size = image.data.len();
    let size_kb = size as f64 / 1024.0;

    info!(
        file = ?image.original_name,
        size_kb,
        time = %details.time,
        classroom = %details.classroom,
        message = %details.message,
        "Upload received"
    );

    let kind = state.validator.validate(&image.data).inspect_err(|err| {
        warn!(file = ?image.original_name, size, error = %err, "Upload rejected");
    })?;

    let filename = generate_filename(&now, kind);
    let stored = state
        .store
        .save(&filename, kind, &image.data)
        .await
        .inspect_err(|err| {
            warn!(%filename, size, content_type = kind.mime_type(), error = %err, "Saving upload failed");
        })?;

    let origin = RequestOrigin::from_parts(&uri, &headers);
    let image_url = resolve_image_url(state.config.base_url.as_deref(), &origin, &stored.filename);
    info!(%image_url, content_type = stored.content_type, "Image published");

    state.probe.probe_and_log(&image_url).await;

    let payload = BroadcastPayload {
        image_url: image_url.clone(),
        preview_image_url: image_url.clone(),
        message: details.message.clone(),
        classroom: details.classroom.clone(),
        time: details.time.clone(),
    };
    let broadcast_sent = match state.dispatcher.dispatch(&payload).await {
        Ok(attempt) => {
            info!(filename = %stored.filename, attempt, "Image uploaded and broadcast sent");
            true
        }
        Err(err) => {
            warn!(filename = %stored.filename, error = %err, "Broadcast failed but image uploaded");
            false
        }
    };

    Ok(Json(RecordResponse {
        ok: true,
        image_url,
        time: details.time,
        classroom: details.classroom,
        message: details.message,
        filename: stored.filename,
        broadcast_sent,
        file_size_kb: size_kb,
        warning: (!broadcast_sent).then(|| BROADCAST_FAILED_WARNING.to_string()),
    }))
}

/// Serve a previously uploaded file with explicit length and caching headers.
pub async fn serve_public(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
) -> Result<Response> {
    let Some(file) = state.store.open_public(&path).await else {
        warn!(%path, "File not found");
        return Err(AppError::NotFound);
    };

    let headers = [
        (header::CONTENT_TYPE, file.content_type.to_string()),
        (header::CONTENT_LENGTH, file.size.to_string()),
        (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
    ];

    if method == Method::HEAD {
        return Ok((headers, Body::empty()).into_response());
    }

    let data = tokio::fs::read(&file.path).await.map_err(|err| {
        warn!(%path, error = %err, "Reading public file failed");
        AppError::NotFound
    })?;
    Ok((headers, data).into_response())
}

/// Rate limit error body.
#[derive(Debug, Serialize)]
pub struct RateLimitedResponse {
    pub error: &'static str,
    pub message: &'static str,
    pub retry_after_secs: u64,
}

/// Token bucket gate in front of every route.
pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    match state.limiter.check().await {
        RateLimitResult::Allowed { remaining } => {
            debug!(remaining, path = %request.uri().path(), "Request allowed");
            next.run(request).await
        }
        RateLimitResult::Limited { retry_after } => {
            let retry_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            info!(path = %request.uri().path(), retry_after_secs = retry_secs, "Request rate limited");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_secs.to_string())],
                Json(RateLimitedResponse {
                    error: "Too many requests",
                    message: "Please wait before making another request",
                    retry_after_secs: retry_secs,
                }),
            )
                .into_response()
        }
    }
}
