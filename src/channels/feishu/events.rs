//! Vendor event envelopes and the typed view of a received message.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Event kinds the app subscribes to. Every subscribed kind must have a
/// handler, otherwise the platform reports "processor not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MessageReceive,
    MessageRead,
    ReactionCreated,
    ReactionDeleted,
    BotP2pChatEntered,
    TaskUpdateTenant,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::MessageReceive,
        EventKind::MessageRead,
        EventKind::ReactionCreated,
        EventKind::ReactionDeleted,
        EventKind::BotP2pChatEntered,
        EventKind::TaskUpdateTenant,
    ];

    pub fn event_type(self) -> &'static str {
        match self {
            EventKind::MessageReceive => "im.message.receive_v1",
            EventKind::MessageRead => "im.message.message_read_v1",
            EventKind::ReactionCreated => "im.message.reaction.created_v1",
            EventKind::ReactionDeleted => "im.message.reaction.deleted_v1",
            EventKind::BotP2pChatEntered => "im.chat.access_event.bot_p2p_chat_entered_v1",
            EventKind::TaskUpdateTenant => "task.task.update_tenant_v1",
        }
    }

    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_type() == event_type)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventHeader {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub create_time: String,
}

/// Schema 2.0 event callback: `{"schema":"2.0","header":{..},"event":{..}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub header: EventHeader,
    #[serde(default)]
    pub event: Value,
}

impl EventEnvelope {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).context("malformed event envelope")
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_event_type(&self.header.event_type)
    }
}

#[derive(Debug, Deserialize)]
struct ReceiveBody {
    sender: SenderBody,
    message: MessageBody,
}

#[derive(Debug, Deserialize)]
struct SenderBody {
    #[serde(default)]
    sender_id: Option<UserIdBody>,
    #[serde(default)]
    sender_type: String,
}

#[derive(Debug, Deserialize)]
struct UserIdBody {
    #[serde(default)]
    open_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message_id: String,
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    chat_type: String,
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    mentions: Option<Vec<Value>>,
}

/// A received message as delivered by `im.message.receive_v1`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub message_id: String,
    pub chat_id: String,
    pub chat_type: String,
    /// Sender open_id, `"unknown"` when the platform omitted it.
    pub sender_id: String,
    pub sender_type: String,
    pub message_type: String,
    /// JSON-encoded, shape depends on `message_type`.
    pub content: String,
    pub mention_count: usize,
}

impl InboundEvent {
    /// Build from the `event` object of a message-receive envelope.
    pub fn from_receive_event(event: &Value) -> Result<Self> {
        let body = ReceiveBody::deserialize(event).context("malformed message event")?;
        let sender_id = body
            .sender
            .sender_id
            .and_then(|id| id.open_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self {
            message_id: body.message.message_id,
            chat_id: body.message.chat_id,
            chat_type: body.message.chat_type,
            sender_id,
            sender_type: body.sender.sender_type,
            message_type: body.message.message_type,
            content: body.message.content,
            mention_count: body.message.mentions.map_or(0, |m| m.len()),
        })
    }

    pub fn is_group(&self) -> bool {
        self.chat_type == "group"
    }

    pub fn is_from_bot(&self) -> bool {
        self.sender_type == "bot"
    }

    /// Where replies go: the group in group chats, the sender in direct chats.
    pub fn reply_to(&self) -> &str {
        if self.is_group() {
            &self.chat_id
        } else {
            &self.sender_id
        }
    }

    /// Decoded content object; malformed or non-object content yields an empty map.
    pub fn content_object(&self) -> Map<String, Value> {
        match serde_json::from_str::<Value>(&self.content) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::parse(&self.message_type, &self.content_object(), &self.content)
    }
}

/// One inline element of a rich-text post.
#[derive(Debug, Clone, PartialEq)]
pub enum PostElement {
    Text(String),
    Link { text: String, href: String },
    At,
    Image { image_key: String },
    Media { file_key: String, file_name: String },
    Emotion(String),
    Unknown,
}

impl PostElement {
    fn parse(element: &Value) -> Self {
        let field = |name: &str| str_field(element, name);
        match element.get("tag").and_then(Value::as_str).unwrap_or_default() {
            "text" => PostElement::Text(field("text")),
            "a" => {
                let href = field("href");
                let text = element
                    .get("text")
                    .and_then(Value::as_str)
                    .map_or_else(|| href.clone(), str::to_string);
                PostElement::Link { text, href }
            }
            "at" => PostElement::At,
            "img" => PostElement::Image {
                image_key: field("image_key"),
            },
            "media" => PostElement::Media {
                file_key: field("file_key"),
                file_name: field("file_name"),
            },
            "emotion" => PostElement::Emotion(
                element
                    .get("emoji_type")
                    .and_then(Value::as_str)
                    .unwrap_or("emoji")
                    .to_string(),
            ),
            _ => PostElement::Unknown,
        }
    }
}

/// A received message's content, decoded per `message_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Text {
        text: String,
    },
    Image {
        image_key: String,
        instruction: String,
    },
    File {
        file_key: String,
        file_name: String,
    },
    Audio {
        file_key: String,
    },
    /// Video.
    Media {
        file_key: String,
        file_name: String,
    },
    Post {
        title: String,
        paragraphs: Vec<Vec<PostElement>>,
    },
    Other(String),
}

fn str_field(value: &Value, name: &str) -> String {
    value
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl MessageKind {
    pub fn parse(message_type: &str, content: &Map<String, Value>, raw: &str) -> Self {
        let obj = Value::Object(content.clone());
        let field = |name: &str| str_field(&obj, name);
        match message_type {
            "text" => MessageKind::Text {
                text: content
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or(raw)
                    .to_string(),
            },
            "image" => MessageKind::Image {
                image_key: field("image_key"),
                instruction: field("text"),
            },
            "file" => MessageKind::File {
                file_key: field("file_key"),
                file_name: field("file_name"),
            },
            "audio" => MessageKind::Audio {
                file_key: field("file_key"),
            },
            "media" => MessageKind::Media {
                file_key: field("file_key"),
                file_name: field("file_name"),
            },
            "post" => MessageKind::Post {
                title: field("title"),
                paragraphs: content
                    .get("content")
                    .and_then(Value::as_array)
                    .map(|paragraphs| {
                        paragraphs
                            .iter()
                            .map(|p| {
                                p.as_array()
                                    .map(|els| els.iter().map(PostElement::parse).collect())
                                    .unwrap_or_default()
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            other => MessageKind::Other(other.to_string()),
        }
    }
}
