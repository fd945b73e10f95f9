//! Upload storage.
//!
//! Validates incoming files against the extension allow-list, gives each one
//! a collision-free sanitized name inside the upload directory and builds an
//! inline preview for images.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use chatdrop_shared::preview::image_preview;
use chatdrop_shared::{FileAttachment, FileKind};

use crate::error::ServerError;

/// Longest sanitized stem kept, in characters.
const MAX_STEM_CHARS: usize = 100;

/// Split a client-supplied name into its final path component's stem and
/// extension. Both `/` and `\` count as separators.
fn split_name(raw_name: &str) -> (&str, Option<&str>) {
    let base = raw_name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(raw_name);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    }
}

/// Keep alphanumerics and `-_.`, join whitespace runs with `_`, drop the rest.
fn sanitize_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut pending_space = false;

    for c in stem.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            continue;
        }
        if c == '.' && out.ends_with('.') {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push('_');
        }
        pending_space = false;
        out.push(c);
    }

    let trimmed: String = out
        .trim_matches(|c: char| c == '.' || c == '_')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

/// An upload that has been written to disk.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
    pub kind: FileKind,
    pub preview: Option<String>,
}

impl StoredUpload {
    pub fn attachment(&self) -> FileAttachment {
        FileAttachment {
            filename: self.filename.clone(),
            path: self.path.display().to_string(),
            image_data: self.preview.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
    max_size: usize,
}

impl UploadStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::Storage(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), max_size, "Upload store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Validate and persist an uploaded file.
    ///
    /// Nothing touches the disk unless the name and size are acceptable.
    pub async fn store_upload(
        &self,
        raw_name: &str,
        data: &[u8],
    ) -> Result<StoredUpload, ServerError> {
        if raw_name.trim().is_empty() {
            return Err(ServerError::MissingFile);
        }
        if data.len() > self.max_size {
            return Err(ServerError::FileTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let (stem, ext) = split_name(raw_name);
        let ext = ext.ok_or_else(|| ServerError::UnsupportedFileType(raw_name.to_string()))?;
        let kind = FileKind::from_extension(ext)
            .ok_or_else(|| ServerError::UnsupportedFileType(ext.to_string()))?;
        let stem = sanitize_stem(stem);

        let (filename, path, mut file) = self.create_unique(&stem, ext).await?;

        let written: std::io::Result<()> = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(ServerError::Storage(format!(
                "Failed to write upload {}: {}",
                filename, e
            )));
        }

        let preview = match kind {
            FileKind::Image => build_preview(data.to_vec()).await,
            _ => None,
        };

        debug!(filename = %filename, size = data.len(), ?kind, "Stored upload");

        Ok(StoredUpload {
            filename,
            path,
            kind,
            preview,
        })
    }

    /// Remove a stored upload whose message record could not be persisted.
    pub async fn discard(&self, upload: &StoredUpload) {
        if let Err(e) = fs::remove_file(&upload.path).await {
            warn!(filename = %upload.filename, error = %e, "Failed to discard upload");
        }
    }

    /// Resolve a download name to a path inside the upload directory.
    ///
    /// Only bare file names are accepted: no separators and no `..`.
    pub fn download_path(&self, filename: &str) -> Result<PathBuf, ServerError> {
        if filename.is_empty()
            || filename.contains(|c: char| c == '/' || c == '\\' || c == '\0')
            || filename.contains("..")
        {
            return Err(ServerError::BadRequest("Invalid file name".to_string()));
        }
        Ok(self.base_path.join(filename))
    }

    /// Claim `<stem>.<ext>`, or the first free `<stem>_<n>.<ext>` for n = 1, 2, ...
    ///
    /// Creation uses create-new semantics, so two concurrent uploads of the
    /// same name can never claim the same file.
    async fn create_unique(
        &self,
        stem: &str,
        ext: &str,
    ) -> Result<(String, PathBuf, fs::File), ServerError> {
        let mut counter: u32 = 0;
        loop {
            let filename = if counter == 0 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}_{counter}.{ext}")
            };
            let path = self.base_path.join(&filename);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((filename, path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.checked_add(1).ok_or_else(|| {
                        ServerError::Storage(format!("No free name left for {stem}.{ext}"))
                    })?;
                }
                Err(e) => {
                    return Err(ServerError::Storage(format!(
                        "Failed to create {}: {}",
                        filename, e
                    )));
                }
            }
        }
    }
}

async fn build_preview(data: Vec<u8>) -> Option<String> {
    match tokio::task::spawn_blocking(move || image_preview(&data)).await {
        Ok(Ok(preview)) => Some(preview),
        Ok(Err(e)) => {
            debug!(error = %e, "No preview for image upload");
            None
        }
        Err(e) => {
            warn!(error = %e, "Preview task failed");
            None
        }
    }
}
