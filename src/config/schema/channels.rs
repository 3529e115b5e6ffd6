use serde::{Deserialize, Serialize};

fn default_feishu_domain() -> String {
    "https://open.feishu.cn".to_string()
}

fn default_react_emoji() -> String {
    "FISTBUMP".to_string()
}

fn default_event_queue_capacity() -> usize {
    256
}

#[derive(Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "appId")]
    pub app_id: String,
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    /// Only used by webhook subscriptions; the long connection delivers plaintext.
    #[serde(default, rename = "encryptKey")]
    pub encrypt_key: String,
    #[serde(default, rename = "verificationToken")]
    pub verification_token: String,
    /// Allowed sender open_ids. Empty allows everyone.
    #[serde(default, rename = "allowFrom")]
    pub allow_from: Vec<String>,
    /// `https://open.feishu.cn`, or `https://open.larksuite.com` for Lark.
    #[serde(default = "default_feishu_domain")]
    pub domain: String,
    /// Emoji type used to acknowledge received messages.
    #[serde(default = "default_react_emoji", rename = "reactEmoji")]
    pub react_emoji: String,
    #[serde(
        default = "default_event_queue_capacity",
        rename = "eventQueueCapacity"
    )]
    pub event_queue_capacity: usize,
}

impl Default for FeishuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_id: String::new(),
            app_secret: String::new(),
            encrypt_key: String::new(),
            verification_token: String::new(),
            allow_from: Vec::new(),
            domain: default_feishu_domain(),
            react_emoji: default_react_emoji(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

redact_debug!(
    FeishuConfig,
    enabled,
    app_id,
    redact(app_secret),
    redact(encrypt_key),
    redact(verification_token),
    allow_from,
    domain,
    react_emoji,
    event_queue_capacity,
);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub feishu: FeishuConfig,
}
