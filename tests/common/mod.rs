// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use anyhow::Result;
use nanobot_feishu::channels::feishu::api::{LarkApi, ReceiveIdType, ResourceType};
use nanobot_feishu::config::FeishuConfig;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Mutex;

/// `LarkApi` that records every call and always succeeds.
#[derive(Default)]
pub struct RecordingLarkApi {
    pub sent: Mutex<Vec<(ReceiveIdType, String, String, String)>>,
    pub reactions: Mutex<Vec<String>>,
}

impl RecordingLarkApi {
    pub fn sent(&self) -> Vec<(ReceiveIdType, String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.lock().unwrap().len()
    }
}

impl LarkApi for RecordingLarkApi {
    fn download_resource(&self, _message_id: &str, key: &str, _: ResourceType) -> Result<Vec<u8>> {
        Ok(key.as_bytes().to_vec())
    }

    fn upload_image(&self, _path: &Path) -> Result<String> {
        Ok("img_key".to_string())
    }

    fn upload_file(&self, _path: &Path, _file_type: &str) -> Result<String> {
        Ok("file_key".to_string())
    }

    fn send_message(
        &self,
        id_type: ReceiveIdType,
        receive_id: &str,
        msg_type: &str,
        content: &str,
    ) -> Result<()> {
        self.sent.lock().unwrap().push((
            id_type,
            receive_id.to_string(),
            msg_type.to_string(),
            content.to_string(),
        ));
        Ok(())
    }

    fn add_reaction(&self, message_id: &str, _emoji_type: &str) -> Result<()> {
        self.reactions.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

pub fn feishu_config(domain: &str) -> FeishuConfig {
    FeishuConfig {
        enabled: true,
        app_id: "cli_test".to_string(),
        app_secret: "test_secret".to_string(),
        domain: domain.to_string(),
        ..Default::default()
    }
}

/// Schema 2.0 `im.message.receive_v1` envelope.
pub fn receive_event(message_id: &str, chat_type: &str, message_type: &str, content: &Value) -> Value {
    json!({
        "schema": "2.0",
        "header": {
            "event_id": format!("ev_{message_id}"),
            "event_type": "im.message.receive_v1",
            "create_time": "1700000000000"
        },
        "event": {
            "sender": {
                "sender_id": {"open_id": "ou_tester"},
                "sender_type": "user"
            },
            "message": {
                "message_id": message_id,
                "chat_id": "oc_team",
                "chat_type": chat_type,
                "message_type": message_type,
                "content": content.to_string(),
                "mentions": if chat_type == "group" { json!([{"key": "@_user_1"}]) } else { Value::Null }
            }
        }
    })
}
