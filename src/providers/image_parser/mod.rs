use super::base::ImageDescriber;
use super::{check_response, is_transient, provider_http_client};
use crate::config::ImageParserConfig;
use crate::utils::media::image_mime_from_path;
use crate::utils::regex::RegexPatterns;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{Value, json};
use std::path::Path;
use tracing::{debug, error, warn};

const PROVIDER_NAME: &str = "image parser";

/// Vision model behind an OpenAI-compatible `/v1/chat/completions` endpoint (vLLM, SGLang, ...).
pub struct VllmImageParser {
    endpoint: String,
    api_key: String,
    model: String,
    prompt: String,
    system_prompt: String,
    max_tokens: u32,
    client: Client,
}

/// Trim trailing slashes and make sure the base ends in `/v1`.
fn normalize_api_base(api_base: &str) -> String {
    let base = api_base.trim().trim_end_matches('/');
    if base.ends_with("/v1") {
        base.to_string()
    } else {
        format!("{base}/v1")
    }
}

impl VllmImageParser {
    pub fn new(config: &ImageParserConfig) -> Self {
        let api_key = if config.api_key.is_empty() {
            "EMPTY".to_string()
        } else {
            config.api_key.clone()
        };
        Self {
            endpoint: format!("{}/chat/completions", normalize_api_base(&config.api_base)),
            api_key,
            model: config.model.clone(),
            prompt: config.prompt.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            client: provider_http_client(config.timeout_seconds),
        }
    }

    /// Build the parser when the config enables it and names an endpoint and model.
    pub fn from_config(config: &ImageParserConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        if config.api_base.trim().is_empty() || config.model.trim().is_empty() {
            warn!("image parser enabled but apiBase/model missing, skipping");
            return None;
        }
        Some(Self::new(config))
    }

    async fn parse(&self, image_path: &Path, instruction: &str) -> Result<String> {
        let bytes = tokio::fs::read(image_path)
            .await
            .with_context(|| format!("Image file not found: {}", image_path.display()))?;
        let image_url = format!(
            "data:{};base64,{}",
            image_mime_from_path(image_path),
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        let prompt = match instruction.trim() {
            "" => self.prompt.as_str(),
            given => given,
        };

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": prompt},
                        {"type": "image_url", "image_url": {"url": image_url}},
                    ],
                },
            ],
            "max_tokens": self.max_tokens,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to image parser")?;
        let json = check_response(resp, PROVIDER_NAME).await?;
        Ok(Self::parse_content(&json))
    }

    /// First choice's text with model special tokens (`<|begin_of_box|>` etc.) removed.
    fn parse_content(json: &Value) -> String {
        let content = json["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice["message"]["content"].as_str())
            .unwrap_or_default();
        RegexPatterns::model_special_token()
            .replace_all(content, "")
            .trim()
            .to_string()
    }
}

#[async_trait]
impl ImageDescriber for VllmImageParser {
    async fn describe(&self, image_path: &Path, instruction: &str) -> String {
        match self.parse(image_path, instruction).await {
            Ok(text) => {
                debug!(
                    "image parser returned {} chars for {}",
                    text.len(),
                    image_path.display()
                );
                text
            }
            Err(e) if is_transient(&e) => {
                warn!("image parser unavailable for {}: {:#}", image_path.display(), e);
                String::new()
            }
            Err(e) => {
                error!("image parse error for {}: {:#}", image_path.display(), e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests;
