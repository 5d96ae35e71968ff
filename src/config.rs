// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the alert relay.
//!
//! Everything is read once at startup from environment variables and is
//! immutable afterwards. `Config::from_lookup` takes the lookup function
//! explicitly so that tests never touch the process environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Configuration errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Configuration for the alert relay service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port on all interfaces (default: 8080)
    pub port: u16,

    /// Externally reachable base URL, used for image links when set
    pub base_url: Option<String>,

    /// CORS allow list
    pub allow_origins: Vec<String>,

    /// Directory served under `/public`; uploads live in `<public_dir>/uploads`
    pub public_dir: PathBuf,

    /// Front-end assets served under `/static` and `/`
    pub static_dir: PathBuf,

    /// Upload limits
    pub upload: UploadConfig,

    /// Messaging platform settings
    pub line: LineConfig,

    /// Token bucket shared by all routes
    pub rate_limit: RateLimitConfig,

    /// Broadcast retry settings
    pub broadcast: BroadcastConfig,

    /// Reachability probe settings
    pub probe: ProbeConfig,

    /// Values handed to the web client by `/firebase-config`
    pub firebase: FirebaseSettings,
}

/// Upload configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes (default: 10 MiB)
    pub max_bytes: usize,
    /// Maximum size of each text field (`time`, `classroom`, `message`)
    pub max_field_bytes: usize,
}

/// LINE Messaging API configuration.
#[derive(Debug, Clone)]
pub struct LineConfig {
    pub channel_secret: String,
    pub channel_token: String,
    /// API base (default: https://api.line.me)
    pub api_base: String,
    /// Per-request timeout (default: 30s)
    pub timeout: Duration,
}

/// Token bucket configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Tokens refilled per second (default: 10)
    pub rate_per_sec: f64,
    /// Bucket capacity (default: 10)
    pub burst: u32,
}

/// Broadcast retry configuration.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Attempts before giving up (default: 3)
    pub max_attempts: u32,
    /// Linear backoff step; attempt n waits n * step (default: 2s)
    pub backoff_step: Duration,
}

/// Reachability probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub enabled: bool,
    /// Delay before probing a freshly written file (default: 100ms)
    pub settle_delay: Duration,
    /// HEAD request timeout (default: 5s)
    pub timeout: Duration,
}

/// Firebase web-client settings. Only the first three are required, and
/// only by `/firebase-config`.
#[derive(Debug, Clone, Default)]
pub struct FirebaseSettings {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub measurement_id: Option<String>,
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_allow_origins() -> Vec<String> {
    vec![
        "http://127.0.0.1:5500".to_string(),
        "http://localhost:5500".to_string(),
    ]
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_field_bytes() -> usize {
    4 * 1024
}

fn default_api_base() -> String {
    "https://api.line.me".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_field_bytes: default_max_field_bytes(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 10.0,
            burst: 10,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Build a config with defaults everywhere except the credentials.
    pub fn with_credentials(channel_secret: &str, channel_token: &str) -> Self {
        Self {
            port: default_port(),
            base_url: None,
            allow_origins: default_allow_origins(),
            public_dir: PathBuf::from("./public"),
            static_dir: PathBuf::from("./static"),
            upload: UploadConfig::default(),
            line: LineConfig {
                channel_secret: channel_secret.to_string(),
                channel_token: channel_token.to_string(),
                api_base: default_api_base(),
                timeout: Duration::from_secs(30),
            },
            rate_limit: RateLimitConfig::default(),
            broadcast: BroadcastConfig::default(),
            probe: ProbeConfig::default(),
            firebase: FirebaseSettings::default(),
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let channel_secret = get("CHANNEL_SECRET").ok_or(ConfigError::Missing("CHANNEL_SECRET"))?;
        let channel_token = get("CHANNEL_TOKEN").ok_or(ConfigError::Missing("CHANNEL_TOKEN"))?;

        let mut config = Self::with_credentials(&channel_secret, &channel_token);

        if let Some(port) = parse_opt::<u16>(&get, "PORT")? {
            config.port = port;
        }

        if let Some(base) = get("BASE_URL") {
            config.base_url = Some(validate_base_url(&base)?);
        }

        if let Some(origins) = get("ALLOW_ORIGINS") {
            let list: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            if !list.is_empty() {
                config.allow_origins = list;
            }
        }

        if let Some(dir) = get("PUBLIC_DIR") {
            config.public_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }

        if let Some(bytes) = parse_opt::<usize>(&get, "UPLOAD_MAX_FIELD_BYTES")? {
            config.upload.max_field_bytes = bytes;
        }

        if let Some(api_base) = get("LINE_API_BASE") {
            config.line.api_base = api_base.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_opt::<u64>(&get, "LINE_TIMEOUT_SECS")? {
            config.line.timeout = Duration::from_secs(secs);
        }

        if let Some(rate) = parse_opt::<f64>(&get, "RATE_LIMIT_PER_SEC")? {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(ConfigError::Invalid {
                    key: "RATE_LIMIT_PER_SEC",
                    value: rate.to_string(),
                });
            }
            config.rate_limit.rate_per_sec = rate;
        }
        if let Some(burst) = parse_opt::<u32>(&get, "RATE_LIMIT_BURST")? {
            config.rate_limit.burst = burst;
        }

        if let Some(attempts) = parse_opt::<u32>(&get, "BROADCAST_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: "BROADCAST_MAX_ATTEMPTS",
                    value: attempts.to_string(),
                });
            }
            config.broadcast.max_attempts = attempts;
        }
        if let Some(secs) = parse_opt::<u64>(&get, "BROADCAST_BACKOFF_SECS")? {
            config.broadcast.backoff_step = Duration::from_secs(secs);
        }

        if let Some(enabled) = parse_opt::<bool>(&get, "PROBE_ENABLED")? {
            config.probe.enabled = enabled;
        }
        if let Some(ms) = parse_opt::<u64>(&get, "PROBE_DELAY_MS")? {
            config.probe.settle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_opt::<u64>(&get, "PROBE_TIMEOUT_SECS")? {
            config.probe.timeout = Duration::from_secs(secs);
        }

        config.firebase = FirebaseSettings {
            api_key: get("FIREBASE_API_KEY"),
            auth_domain: get("FIREBASE_AUTH_DOMAIN"),
            project_id: get("FIREBASE_PROJECT_ID"),
            storage_bucket: get("FIREBASE_STORAGE_BUCKET"),
            messaging_sender_id: get("FIREBASE_MESSAGING_SENDER_ID"),
            app_id: get("FIREBASE_APP_ID"),
            measurement_id: get("FIREBASE_MEASUREMENT_ID"),
        };

        Ok(config)
    }
}

fn parse_opt<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

/// Base URLs must be absolute http(s) URLs; the trailing slash is dropped.
fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "BASE_URL",
        value: raw.to_string(),
    };
    let parsed = Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }
    Ok(raw.trim_end_matches('/').to_string())
}
