// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Local file store for uploaded images.
//!
//! Uploads go into a single flat directory under the public root. Complete
//! files are never overwritten and never deleted; a write that fails or is
//! abandoned midway leaves nothing behind.

use crate::sniff::ImageKind;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Sub-directory of the public root that receives uploads.
pub const UPLOADS_SUBDIR: &str = "uploads";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create upload directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to save {filename}: {source}")]
    Write { filename: String, source: io::Error },
}

/// A persisted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    /// Path relative to the public root, e.g. `uploads/cap_x.png`
    pub relative_path: String,
    pub content_type: &'static str,
    pub size: u64,
}

/// A file found under the public root, ready to be served.
#[derive(Debug)]
pub struct PublicFile {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub size: u64,
}

/// File store rooted at the public directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    public_root: PathBuf,
}

impl FileStore {
    pub fn new(public_root: impl Into<PathBuf>) -> Self {
        Self {
            public_root: public_root.into(),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.public_root.join(UPLOADS_SUBDIR)
    }

    /// Create the uploads directory and its parents. Idempotent.
    pub async fn ensure_dirs(&self) -> Result<(), StoreError> {
        let path = self.uploads_dir();
        fs::create_dir_all(&path)
            .await
            .map_err(|source| StoreError::CreateDir { path: path.clone(), source })?;
        debug!(path = %path.display(), "Upload directory ready");
        Ok(())
    }

    /// Write a validated upload under `filename`.
    ///
    /// The file is opened create-new and synced before returning, so a
    /// follow-up request for it sees the full content.
    pub async fn save(
        &self,
        filename: &str,
        kind: ImageKind,
        data: &[u8],
    ) -> Result<StoredImage, StoreError> {
        let path = self.uploads_dir().join(filename);
        let write_err = |source| StoreError::Write {
            filename: filename.to_string(),
            source,
        };

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        let partial = PartialUpload::new(&path);
        file.write_all(data).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        partial.keep();

        info!(path = %path.display(), size = data.len(), "File saved");

        Ok(StoredImage {
            filename: filename.to_string(),
            relative_path: format!("{UPLOADS_SUBDIR}/{filename}"),
            content_type: kind.mime_type(),
            size: data.len() as u64,
        })
    }

    /// Look up a file under the public root.
    ///
    /// Returns `None` for missing files, directories, and any path that
    /// tries to leave the root.
    pub async fn open_public(&self, request_path: &str) -> Option<PublicFile> {
        let relative = sanitize(request_path)?;
        let path = self.public_root.join(relative);

        let metadata = fs::metadata(&path).await.ok()?;
        if !metadata.is_file() {
            return None;
        }

        Some(PublicFile {
            content_type: content_type_for(&path),
            size: metadata.len(),
            path,
        })
    }
}

/// Removes a file this store just created unless `keep` is called, so a
/// failed or cancelled write is never served.
struct PartialUpload<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> PartialUpload<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, keep: false }
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartialUpload<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed incomplete upload"),
            Err(err) => warn!(path = %self.path.display(), error = %err, "Failed to remove incomplete upload"),
        }
    }
}

/// Keep only normal path components; reject `..` and absolute prefixes.
fn sanitize(request_path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(request_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
