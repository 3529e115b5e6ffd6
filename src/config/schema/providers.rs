use serde::{Deserialize, Serialize};

fn default_image_prompt() -> String {
    "使用markdown语法，将图片中识别到的文字转换为markdown格式输出。".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_image_max_tokens() -> u32 {
    4096
}

fn default_image_timeout() -> u64 {
    60
}

/// OpenAI-compatible vision endpoint used to describe inbound images.
#[derive(Clone, Serialize, Deserialize)]
pub struct ImageParserConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "apiBase")]
    pub api_base: String,
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    /// Used when the message carries no instruction of its own.
    #[serde(default = "default_image_prompt")]
    pub prompt: String,
    #[serde(default = "default_system_prompt", rename = "systemPrompt")]
    pub system_prompt: String,
    #[serde(default = "default_image_max_tokens", rename = "maxTokens")]
    pub max_tokens: u32,
    #[serde(default = "default_image_timeout", rename = "timeoutSeconds")]
    pub timeout_seconds: u64,
}

impl Default for ImageParserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: String::new(),
            api_key: String::new(),
            model: String::new(),
            prompt: default_image_prompt(),
            system_prompt: default_system_prompt(),
            max_tokens: default_image_max_tokens(),
            timeout_seconds: default_image_timeout(),
        }
    }
}

redact_debug!(
    ImageParserConfig,
    enabled,
    api_base,
    redact(api_key),
    model,
    prompt,
    system_prompt,
    max_tokens,
    timeout_seconds,
);

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default, rename = "apiBase")]
    pub api_base: Option<String>,
}

redact_debug!(ProviderConfig, redact(api_key), api_base,);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default, rename = "imageParser")]
    pub image_parser: ImageParserConfig,
    /// Whisper transcription for inbound audio; disabled while the key is empty.
    #[serde(default)]
    pub groq: ProviderConfig,
}
