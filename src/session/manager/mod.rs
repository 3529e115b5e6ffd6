use crate::session::store::SessionStore;
use crate::utils::{atomic_write, ensure_dir, get_nanobot_home, safe_filename};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const MAX_CACHED_SESSIONS: NonZeroUsize = NonZeroUsize::new(64).unwrap();
const MAX_SESSION_MESSAGES: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub messages: Vec<MessageData>,
    #[serde(default = "chrono::Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "chrono::Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageData {
    pub role: String,
    pub content: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn add_message(
        &mut self,
        role: impl Into<String>,
        content: impl Into<String>,
        extra: HashMap<String, Value>,
    ) {
        self.messages.push(MessageData {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
            extra,
        });
        self.updated_at = Utc::now();

        if self.messages.len() > MAX_SESSION_MESSAGES {
            let drain_count = self.messages.len() - MAX_SESSION_MESSAGES;
            self.messages.drain(..drain_count);
        }
    }

    /// Drop all messages, returning how many were removed. Metadata is kept.
    pub fn clear(&mut self) -> usize {
        let cleared = self.messages.len();
        self.messages.clear();
        self.updated_at = Utc::now();
        cleared
    }
}

/// JSONL-backed session store: one metadata line followed by one line per message.
pub struct SessionManager {
    sessions_dir: PathBuf,
    cache: Mutex<LruCache<String, Session>>,
}

impl SessionManager {
    pub fn new(sessions_dir: &Path) -> Result<Self> {
        let sessions_dir = ensure_dir(sessions_dir)?;
        Ok(Self {
            sessions_dir,
            cache: Mutex::new(LruCache::new(MAX_CACHED_SESSIONS)),
        })
    }

    /// Sessions under `~/.nanobot/sessions`.
    pub fn in_home() -> Result<Self> {
        Self::new(&get_nanobot_home()?.join("sessions"))
    }

    fn get_session_path(&self, key: &str) -> PathBuf {
        let safe_key = safe_filename(&key.replace(':', "_"));
        self.sessions_dir.join(format!("{}.jsonl", safe_key))
    }

    pub async fn get_or_create(&self, key: &str) -> Result<Session> {
        let cached = {
            let mut cache = self.cache.lock().await;
            cache.get(key).cloned()
        };
        if let Some(session) = cached {
            return Ok(session);
        }

        let session = self
            .load(key)?
            .unwrap_or_else(|| Session::new(key));

        let mut cache = self.cache.lock().await;
        // Another task may have loaded it while the lock was released
        if let Some(existing) = cache.get(key) {
            return Ok(existing.clone());
        }
        cache.put(key.to_string(), session.clone());
        Ok(session)
    }

    fn load(&self, key: &str) -> Result<Option<Session>> {
        let path = self.get_session_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;

        let mut session = Session::new(key);
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let data: Value =
                serde_json::from_str(line).with_context(|| "Failed to parse session JSON line")?;

            if data.get("_type").and_then(Value::as_str) == Some("metadata") {
                if let Some(meta) = data.get("metadata").and_then(Value::as_object) {
                    session
                        .metadata
                        .extend(meta.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                if let Some(ts) = data.get("created_at").and_then(Value::as_str)
                    && let Ok(dt) = DateTime::parse_from_rfc3339(ts)
                {
                    session.created_at = dt.with_timezone(&Utc);
                }
                continue;
            }

            let text = |field: &str| {
                data.get(field)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let extra = data
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter(|(k, _)| !matches!(k.as_str(), "role" | "content" | "timestamp"))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            session.messages.push(MessageData {
                role: text("role"),
                content: text("content"),
                timestamp: text("timestamp"),
                extra,
            });
        }

        if session.messages.len() > MAX_SESSION_MESSAGES {
            let drain_count = session.messages.len() - MAX_SESSION_MESSAGES;
            session.messages.drain(..drain_count);
        }
        debug!(
            "loaded session {} ({} messages)",
            key,
            session.messages.len()
        );
        Ok(Some(session))
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        let path = self.get_session_path(&session.key);

        let mut content = String::new();
        let metadata_line = serde_json::json!({
            "_type": "metadata",
            "key": session.key,
            "created_at": session.created_at.to_rfc3339(),
            "updated_at": session.updated_at.to_rfc3339(),
            "metadata": session.metadata,
        });
        content.push_str(&serde_json::to_string(&metadata_line)?);
        content.push('\n');

        for msg in &session.messages {
            content.push_str(&serde_json::to_string(msg)?);
            content.push('\n');
        }

        atomic_write(&path, &content)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;

        self.cache
            .lock()
            .await
            .put(session.key.clone(), session.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SessionManager {
    async fn get_or_create(&self, key: &str) -> Result<Session> {
        SessionManager::get_or_create(self, key).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        SessionManager::save(self, session).await
    }
}
