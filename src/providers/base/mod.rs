use async_trait::async_trait;
use std::path::Path;

/// Turns a local image into text. Failures are logged and yield an empty string.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    /// `instruction` comes from the message itself; empty means "use the default prompt".
    async fn describe(&self, image_path: &Path, instruction: &str) -> String;
}

/// Speech-to-text for downloaded audio. Failures are logged and yield an empty string.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> String;
}
