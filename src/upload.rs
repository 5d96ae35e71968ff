// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Upload validation.
//!
//! Checks the size and sniffed type of an uploaded image, fills in
//! defaults for the alert metadata, and derives the stored filename.

use crate::config::UploadConfig;
use crate::sniff::{sniff, ImageKind, Sniffed};
use chrono::{DateTime, TimeZone};
use thiserror::Error;
use tracing::debug;

/// Placeholder classroom when the client sends none.
pub const DEFAULT_CLASSROOM: &str = "ห้องเรียน";

/// Placeholder alert text when the client sends none.
pub const DEFAULT_MESSAGE: &str = "มีคนใช้งานเกินเวลา";

/// Upload rejection reasons.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Missing file field: image")]
    MissingFile,

    #[error("File too large (max {max_bytes} bytes)")]
    TooLarge { max_bytes: usize },

    #[error("Field too large: {field} (max {max_bytes} bytes)")]
    FieldTooLarge { field: &'static str, max_bytes: usize },

    #[error("Unsupported file type: {content_type}")]
    UnsupportedType { content_type: String },

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

/// Alert metadata after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDetails {
    /// "HH:MM"
    pub time: String,
    pub classroom: String,
    pub message: String,
}

impl AlertDetails {
    /// Apply defaults to the optional form fields. Blank values count as absent.
    pub fn from_form<Tz: TimeZone>(
        time: Option<String>,
        classroom: Option<String>,
        message: Option<String>,
        now: &DateTime<Tz>,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Self {
            time: present(time).unwrap_or_else(|| now.format("%H:%M").to_string()),
            classroom: present(classroom).unwrap_or_else(|| DEFAULT_CLASSROOM.to_string()),
            message: present(message).unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
        }
    }
}

/// Upload validator.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    config: UploadConfig,
}

impl UploadValidator {
    /// Create a new validator with the given configuration.
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Reject sizes over the limit.
    pub fn check_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.config.max_bytes {
            debug!(size, max_bytes = self.config.max_bytes, "Upload too large");
            return Err(UploadError::TooLarge {
                max_bytes: self.config.max_bytes,
            });
        }
        Ok(())
    }

    /// Reject a text field once it grows past the per-field limit.
    pub fn check_field_size(&self, field: &'static str, size: usize) -> Result<(), UploadError> {
        if size > self.config.max_field_bytes {
            debug!(field, size, max_bytes = self.config.max_field_bytes, "Form field too large");
            return Err(UploadError::FieldTooLarge {
                field,
                max_bytes: self.config.max_field_bytes,
            });
        }
        Ok(())
    }

    /// Validate a complete payload: size first, then sniffed type.
    pub fn validate(&self, data: &[u8]) -> Result<ImageKind, UploadError> {
        self.check_size(data.len())?;

        match sniff(data) {
            Sniffed::Image(kind) => {
                debug!(content_type = kind.mime_type(), size = data.len(), "Upload valid");
                Ok(kind)
            }
            Sniffed::Other(content_type) => {
                debug!(content_type, "Unsupported upload type");
                Err(UploadError::UnsupportedType {
                    content_type: content_type.to_string(),
                })
            }
        }
    }
}

/// Derive the stored filename from the upload time.
///
/// `cap_<yyyyMMdd_HHmmss>_<microseconds><ext>`; a pure function of `now`.
pub fn generate_filename<Tz: TimeZone>(now: &DateTime<Tz>, kind: ImageKind) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "cap_{}_{:06}{}",
        now.format("%Y%m%d_%H%M%S"),
        now.timestamp_subsec_micros() % 1_000_000,
        kind.extension()
    )
}
