//! Attachment download into the media directory and upload routing for outbound files.

use super::api::{LarkApi, ResourceType};
use crate::utils::media::dotted_extension;
use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The message type an attachment was received as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Audio,
    /// Video.
    Media,
    File,
}

impl ResourceKind {
    /// Audio, video and files all download through the `file` resource type.
    pub fn resource_type(self) -> ResourceType {
        match self {
            Self::Image => ResourceType::Image,
            Self::Audio | Self::Media | Self::File => ResourceType::File,
        }
    }

    pub fn default_extension(self) -> &'static str {
        match self {
            Self::Image => ".png",
            Self::Audio => ".opus",
            Self::Media => ".mp4",
            Self::File => ".bin",
        }
    }
}

/// Local file name for a downloaded resource.
///
/// A supplied name keeps its text with path separators replaced; otherwise the
/// first 20 characters of the key plus the kind's default extension.
pub fn local_file_name(key: &str, kind: ResourceKind, file_name: &str) -> String {
    if !file_name.is_empty() {
        return file_name.replace(['/', '\\'], "_");
    }
    let prefix: String = key.chars().take(20).collect();
    format!("{}{}", prefix, kind.default_extension())
}

/// Downloads message resources on the blocking pool.
#[derive(Clone)]
pub struct MediaFetcher {
    api: Arc<dyn LarkApi>,
    dir: PathBuf,
}

impl MediaFetcher {
    pub fn new(api: Arc<dyn LarkApi>, dir: PathBuf) -> Self {
        Self { api, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `key` from `message_id` into the media directory.
    /// Any failure is logged and yields `None`.
    pub async fn fetch(
        &self,
        message_id: &str,
        key: &str,
        kind: ResourceKind,
        file_name: &str,
    ) -> Option<PathBuf> {
        let api = self.api.clone();
        let path = self.dir.join(local_file_name(key, kind, file_name));
        let message_id = message_id.to_string();
        let key = key.to_string();

        let result = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let bytes = api.download_resource(&message_id, &key, kind.resource_type())?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(path)
        })
        .await;

        match result {
            Ok(Ok(path)) => {
                debug!("downloaded {:?} resource -> {}", kind, path.display());
                Some(path)
            }
            Ok(Err(e)) => {
                error!("failed to download Feishu resource: {:#}", e);
                None
            }
            Err(e) => {
                error!("resource download task failed: {}", e);
                None
            }
        }
    }
}

/// How an outbound local file is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Image,
    File { file_type: &'static str },
}

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Feishu `file_type` for an extension; unknown types upload as `stream`.
pub fn file_type_for_extension(ext: &str) -> &'static str {
    match ext {
        ".opus" => "opus",
        ".mp4" => "mp4",
        ".pdf" => "pdf",
        ".doc" | ".docx" => "doc",
        ".xls" | ".xlsx" => "xls",
        ".ppt" | ".pptx" => "ppt",
        _ => "stream",
    }
}

pub fn classify_attachment(path: &Path) -> Attachment {
    let ext = dotted_extension(path);
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Attachment::Image
    } else {
        Attachment::File {
            file_type: file_type_for_extension(&ext),
        }
    }
}

/// Upload one outbound file, returning the `(msg_type, content)` to send.
/// Missing files and failed uploads are logged and yield `None`.
pub async fn upload_attachment(
    api: Arc<dyn LarkApi>,
    path: PathBuf,
) -> Option<(&'static str, String)> {
    if !path.exists() {
        warn!("media file not found: {}", path.display());
        return None;
    }

    let attachment = classify_attachment(&path);
    let shown = path.display().to_string();
    let result = tokio::task::spawn_blocking(move || match attachment {
        Attachment::Image => api
            .upload_image(&path)
            .map(|key| ("image", json!({ "image_key": key }).to_string())),
        Attachment::File { file_type } => api
            .upload_file(&path, file_type)
            .map(|key| ("file", json!({ "file_key": key }).to_string())),
    })
    .await;

    match result {
        Ok(Ok(message)) => {
            debug!("uploaded {} as {}", shown, message.0);
            Some(message)
        }
        Ok(Err(e)) => {
            error!("failed to upload {}: {:#}", shown, e);
            None
        }
        Err(e) => {
            error!("upload task failed for {}: {}", shown, e);
            None
        }
    }
}
