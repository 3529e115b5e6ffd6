use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Return the `~/.nanobot/media/` directory, creating it if needed.
pub fn media_dir() -> Result<PathBuf> {
    let dir = super::get_nanobot_home()
        .context("failed to determine nanobot home")?
        .join("media");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create media directory: {}", dir.display()))?;
    Ok(dir)
}

/// Lower-cased extension of a path including the leading dot (`".png"`), or empty.
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Guess an image MIME type from the file extension, defaulting to `image/png`.
pub fn image_mime_from_path(path: &Path) -> &'static str {
    match dotted_extension(path).as_str() {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".bmp" => "image/bmp",
        _ => "image/png",
    }
}
