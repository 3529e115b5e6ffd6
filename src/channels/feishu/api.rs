//! Blocking REST client for the Feishu/Lark open platform.
//!
//! Every method blocks the calling thread; async callers go through
//! `tokio::task::spawn_blocking`.

use crate::config::FeishuConfig;
use crate::errors::NanobotError;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Refresh the tenant token this long before the platform expires it.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Which id space a `receive_id` belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveIdType {
    ChatId,
    OpenId,
}

impl ReceiveIdType {
    /// Group chat ids carry the `oc_` prefix; anything else is a user open_id.
    pub fn for_target(receive_id: &str) -> Self {
        if receive_id.starts_with("oc_") {
            Self::ChatId
        } else {
            Self::OpenId
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatId => "chat_id",
            Self::OpenId => "open_id",
        }
    }
}

/// `type` query parameter of the message-resource download endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    File,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::File => "file",
        }
    }
}

/// The vendor operations the channel needs.
pub trait LarkApi: Send + Sync {
    fn download_resource(
        &self,
        message_id: &str,
        key: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<u8>>;

    /// Upload an image for use in messages, returning its `image_key`.
    fn upload_image(&self, path: &Path) -> Result<String>;

    /// Upload a file, returning its `file_key`.
    fn upload_file(&self, path: &Path, file_type: &str) -> Result<String>;

    fn send_message(
        &self,
        id_type: ReceiveIdType,
        receive_id: &str,
        msg_type: &str,
        content: &str,
    ) -> Result<()>;

    fn add_reaction(&self, message_id: &str, emoji_type: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct LarkClientConfig {
    pub app_id: String,
    pub app_secret: String,
    /// Platform origin, e.g. `https://open.feishu.cn`.
    pub domain: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl LarkClientConfig {
    pub fn from_feishu(config: &FeishuConfig) -> Self {
        Self {
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            domain: config.domain.clone(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl std::fmt::Debug for LarkClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LarkClientConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("domain", &self.domain)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    #[serde(default)]
    expire: u64,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    image_key: String,
}

#[derive(Debug, Deserialize)]
struct FileData {
    file_key: String,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct LarkClient {
    config: LarkClientConfig,
    base_url: String,
    http: Client,
    token: Mutex<Option<CachedToken>>,
}

impl LarkClient {
    /// Must not be called from inside an async context (the blocking client owns a runtime).
    pub fn new(config: LarkClientConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build Feishu HTTP client")?;
        let base_url = format!("{}/open-apis", config.domain.trim_end_matches('/'));
        Ok(Self {
            config,
            base_url,
            http,
            token: Mutex::new(None),
        })
    }

    fn tenant_token(&self) -> Result<String> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("tenant token lock poisoned"))?;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let resp: TokenResponse = self
            .http
            .post(format!(
                "{}/auth/v3/tenant_access_token/internal",
                self.base_url
            ))
            .json(&json!({
                "app_id": self.config.app_id,
                "app_secret": self.config.app_secret,
            }))
            .send()
            .context("tenant token request failed")?
            .json()
            .context("malformed tenant token response")?;
        if resp.code != 0 || resp.tenant_access_token.is_empty() {
            return Err(NanobotError::feishu(format!(
                "tenant token: code={}, msg={}",
                resp.code, resp.msg
            ))
            .into());
        }

        let lifetime = Duration::from_secs(resp.expire).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("fetched Feishu tenant token (valid {}s)", resp.expire);
        *cached = Some(CachedToken {
            value: resp.tenant_access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(resp.tenant_access_token)
    }

    fn check<T: DeserializeOwned>(op: &str, resp: Response) -> Result<Option<T>> {
        let status = resp.status();
        let body: ApiResponse<T> = resp
            .json()
            .with_context(|| format!("{op}: unreadable response (HTTP {status})"))?;
        if body.code != 0 {
            return Err(NanobotError::feishu(format!(
                "{op} failed: code={}, msg={}",
                body.code, body.msg
            ))
            .into());
        }
        Ok(body.data)
    }
}

impl LarkApi for LarkClient {
    fn download_resource(
        &self,
        message_id: &str,
        key: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<u8>> {
        let token = self.tenant_token()?;
        let resp = self
            .http
            .get(format!(
                "{}/im/v1/messages/{}/resources/{}",
                self.base_url, message_id, key
            ))
            .query(&[("type", resource_type.as_str())])
            .bearer_auth(token)
            .send()
            .context("resource download request failed")?;

        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if !resp.status().is_success() || is_json {
            Self::check::<serde_json::Value>("download resource", resp)?;
            anyhow::bail!("download resource: no content returned");
        }
        Ok(resp.bytes().context("failed reading resource body")?.to_vec())
    }

    fn upload_image(&self, path: &Path) -> Result<String> {
        let token = self.tenant_token()?;
        let form = multipart::Form::new()
            .text("image_type", "message")
            .file("image", path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let resp = self
            .http
            .post(format!("{}/im/v1/images", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .context("image upload request failed")?;
        Self::check::<ImageData>("upload image", resp)?
            .map(|d| d.image_key)
            .context("upload image: response missing image_key")
    }

    fn upload_file(&self, path: &Path, file_type: &str) -> Result<String> {
        let token = self.tenant_token()?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let form = multipart::Form::new()
            .text("file_type", file_type.to_string())
            .text("file_name", file_name)
            .file("file", path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let resp = self
            .http
            .post(format!("{}/im/v1/files", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .context("file upload request failed")?;
        Self::check::<FileData>("upload file", resp)?
            .map(|d| d.file_key)
            .context("upload file: response missing file_key")
    }

    fn send_message(
        &self,
        id_type: ReceiveIdType,
        receive_id: &str,
        msg_type: &str,
        content: &str,
    ) -> Result<()> {
        let token = self.tenant_token()?;
        let resp = self
            .http
            .post(format!("{}/im/v1/messages", self.base_url))
            .query(&[("receive_id_type", id_type.as_str())])
            .bearer_auth(token)
            .json(&json!({
                "receive_id": receive_id,
                "msg_type": msg_type,
                "content": content,
            }))
            .send()
            .context("send message request failed")?;
        Self::check::<serde_json::Value>("send message", resp)?;
        Ok(())
    }

    fn add_reaction(&self, message_id: &str, emoji_type: &str) -> Result<()> {
        let token = self.tenant_token()?;
        let resp = self
            .http
            .post(format!(
                "{}/im/v1/messages/{}/reactions",
                self.base_url, message_id
            ))
            .bearer_auth(token)
            .json(&json!({ "reaction_type": { "emoji_type": emoji_type } }))
            .send()
            .context("add reaction request failed")?;
        Self::check::<serde_json::Value>("add reaction", resp)?;
        Ok(())
    }
}
