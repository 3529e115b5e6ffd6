use super::base::Transcriber;
use super::{check_response, is_transient, provider_http_client};
use crate::config::ProviderConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tracing::{debug, error, warn};

const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
const TRANSCRIPTION_MODEL: &str = "whisper-large-v3";
const TRANSCRIPTION_TIMEOUT_SECS: u64 = 60;

pub struct GroqTranscriptionProvider {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl GroqTranscriptionProvider {
    pub fn new(api_key: impl Into<String>, api_base: Option<&str>) -> Self {
        let base = api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/');
        Self {
            api_key: api_key.into(),
            endpoint: format!("{base}/audio/transcriptions"),
            client: provider_http_client(TRANSCRIPTION_TIMEOUT_SECS),
        }
    }

    /// `None` while no API key is configured.
    pub fn from_config(config: &ProviderConfig) -> Option<Self> {
        if config.api_key.is_empty() {
            return None;
        }
        Some(Self::new(config.api_key.clone(), config.api_base.as_deref()))
    }

    async fn request(&self, path: &Path) -> Result<String> {
        let file_bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Audio file not found: {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(file_bytes).file_name(file_name),
            )
            .text("model", TRANSCRIPTION_MODEL);

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request")?;
        let data = check_response(resp, "Groq").await?;
        Ok(data["text"].as_str().unwrap_or_default().trim().to_string())
    }
}

#[async_trait]
impl Transcriber for GroqTranscriptionProvider {
    async fn transcribe(&self, audio_path: &Path) -> String {
        match self.request(audio_path).await {
            Ok(text) => {
                debug!(
                    "transcribed {} ({} chars)",
                    audio_path.display(),
                    text.len()
                );
                text
            }
            Err(e) if is_transient(&e) => {
                warn!("transcription unavailable for {}: {:#}", audio_path.display(), e);
                String::new()
            }
            Err(e) => {
                error!("transcription failed for {}: {:#}", audio_path.display(), e);
                String::new()
            }
        }
    }
}
