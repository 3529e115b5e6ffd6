//! In-memory `LarkApi` for exercising the channel without the network.

use super::api::{LarkApi, ReceiveIdType, ResourceType};
use anyhow::{Result, bail};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id_type: ReceiveIdType,
    pub receive_id: String,
    pub msg_type: String,
    pub content: String,
}

#[derive(Default)]
pub struct MockLarkApi {
    pub failing_keys: Mutex<HashSet<String>>,
    pub fail_uploads: Mutex<bool>,
    pub downloads: Mutex<Vec<(String, String, ResourceType)>>,
    pub uploads: Mutex<Vec<(String, Option<String>)>>,
    pub sent: Mutex<Vec<SentMessage>>,
    pub reactions: Mutex<Vec<(String, String)>>,
}

impl MockLarkApi {
    pub fn fail_download(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reactions(&self) -> Vec<(String, String)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<(String, String, ResourceType)> {
        self.downloads.lock().unwrap().clone()
    }
}

impl LarkApi for MockLarkApi {
    fn download_resource(
        &self,
        message_id: &str,
        key: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<u8>> {
        self.downloads.lock().unwrap().push((
            message_id.to_string(),
            key.to_string(),
            resource_type,
        ));
        if self.failing_keys.lock().unwrap().contains(key) {
            bail!("download refused for {key}");
        }
        Ok(format!("bytes of {key}").into_bytes())
    }

    fn upload_image(&self, path: &Path) -> Result<String> {
        self.uploads
            .lock()
            .unwrap()
            .push((path.display().to_string(), None));
        if *self.fail_uploads.lock().unwrap() {
            bail!("upload refused");
        }
        Ok("img_v2_key".to_string())
    }

    fn upload_file(&self, path: &Path, file_type: &str) -> Result<String> {
        self.uploads
            .lock()
            .unwrap()
            .push((path.display().to_string(), Some(file_type.to_string())));
        if *self.fail_uploads.lock().unwrap() {
            bail!("upload refused");
        }
        Ok("file_v2_key".to_string())
    }

    fn send_message(
        &self,
        id_type: ReceiveIdType,
        receive_id: &str,
        msg_type: &str,
        content: &str,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            id_type,
            receive_id: receive_id.to_string(),
            msg_type: msg_type.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    fn add_reaction(&self, message_id: &str, emoji_type: &str) -> Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((message_id.to_string(), emoji_type.to_string()));
        Ok(())
    }
}
