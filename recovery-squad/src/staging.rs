//! Image staging
//!
//! Uploaded screenshots are written to `{staging dir}/temp_{filename}` and
//! handed to the model layer as path-backed references. Files are never
//! cleaned up here, and a later upload with the same filename overwrites
//! the earlier one.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const STAGED_PREFIX: &str = "temp_";

/// Raw upload as received from the form
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    pub fn has_allowed_extension(&self) -> bool {
        self.extension()
            .map(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
            .unwrap_or(false)
    }
}

/// Filesystem-backed image reference consumed by the model client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedImage {
    path: PathBuf,
    mime_type: String,
}

impl StagedImage {
    pub fn from_path(path: PathBuf) -> Self {
        let mime_type = mime_for_path(&path).to_string();
        Self { path, mime_type }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Reads the staged file and encodes it as `data:<mime>;base64,...`
    pub async fn to_data_url(&self) -> io::Result<String> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(format!("data:{};base64,{}", self.mime_type, STANDARD.encode(bytes)))
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Target path for an upload. Only the last path component of the client
/// supplied name is used; names that reduce to nothing are refused.
pub fn staged_path(dir: &Path, filename: &str) -> Option<PathBuf> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(dir.join(format!("{}{}", STAGED_PREFIX, base)))
}

/// Stage every upload in order. A file that cannot be written is logged and
/// left out; the rest still come back, in their original relative order.
pub async fn stage_images(dir: &Path, uploads: &[UploadedImage]) -> Vec<StagedImage> {
    let mut staged = Vec::with_capacity(uploads.len());

    for upload in uploads {
        let Some(path) = staged_path(dir, &upload.filename) else {
            log::error!("[STAGING] Error processing image '{}': unusable filename", upload.filename);
            continue;
        };

        match tokio::fs::write(&path, &upload.bytes).await {
            Ok(()) => {
                log::debug!(
                    "[STAGING] Staged '{}' ({} bytes) at {}",
                    upload.filename,
                    upload.bytes.len(),
                    path.display()
                );
                let mut image = StagedImage::from_path(path);
                if let Some(ct) = upload.content_type.as_deref().filter(|ct| ct.starts_with("image/")) {
                    if image.mime_type == "application/octet-stream" {
                        image.mime_type = ct.to_string();
                    }
                }
                staged.push(image);
            }
            Err(e) => {
                log::error!("[STAGING] Error processing image '{}': {}", upload.filename, e);
            }
        }
    }

    staged
}
