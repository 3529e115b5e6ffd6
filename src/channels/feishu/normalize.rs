//! Turns a received message into bus content: ordered text fragments plus local media paths.

use super::commands::Command;
use super::events::{InboundEvent, MessageKind, PostElement};
use super::media::{MediaFetcher, ResourceKind};
use crate::providers::{ImageDescriber, Transcriber};
use crate::utils::regex::strip_feishu_mentions;
use std::path::Path;
use std::sync::Arc;

pub const EMPTY_MESSAGE: &str = "[empty message]";

/// Placeholder for message types with no dedicated handling.
pub fn placeholder_for(message_type: &str) -> String {
    match message_type {
        "image" => "[image]".to_string(),
        "audio" => "[audio]".to_string(),
        "media" => "[video]".to_string(),
        "file" => "[file]".to_string(),
        "sticker" => "[sticker]".to_string(),
        other => format!("[{other}]"),
    }
}

/// Result of normalizing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Forward { content: String, media: Vec<String> },
    /// A recognized slash command; the caller answers it and nothing is forwarded.
    Command(Command),
    Skip,
}

#[derive(Debug, Default)]
struct Fragments {
    parts: Vec<String>,
    media: Vec<String>,
}

impl Fragments {
    fn push(&mut self, part: impl Into<String>) {
        self.parts.push(part.into());
    }

    fn attach(&mut self, path: &Path) {
        self.media.push(path.display().to_string());
    }

    fn finish(self) -> Normalized {
        let content = if self.parts.is_empty() {
            EMPTY_MESSAGE.to_string()
        } else {
            self.parts.join("\n")
        };
        if content.trim().is_empty() {
            return Normalized::Skip;
        }
        Normalized::Forward {
            content,
            media: self.media,
        }
    }
}

#[derive(Clone)]
pub struct Normalizer {
    fetcher: MediaFetcher,
    describer: Option<Arc<dyn ImageDescriber>>,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl Normalizer {
    pub fn new(
        fetcher: MediaFetcher,
        describer: Option<Arc<dyn ImageDescriber>>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            fetcher,
            describer,
            transcriber,
        }
    }

    pub async fn normalize(&self, event: &InboundEvent) -> Normalized {
        let mut out = Fragments::default();
        match event.kind() {
            MessageKind::Text { text } => {
                let text = if event.is_group() {
                    strip_feishu_mentions(&text)
                } else {
                    text
                };
                if text.trim().starts_with('/')
                    && let Some(command) = Command::parse(&text)
                {
                    return Normalized::Command(command);
                }
                if !text.is_empty() {
                    out.push(text);
                }
            }
            MessageKind::Image {
                image_key,
                instruction,
            } => {
                if image_key.is_empty() {
                    out.push("[image]");
                } else {
                    self.image(event, &image_key, &instruction, &mut out).await;
                }
            }
            MessageKind::File {
                file_key,
                file_name,
            } => self.file(event, &file_key, &file_name, &mut out).await,
            MessageKind::Audio { file_key } => self.audio(event, &file_key, &mut out).await,
            MessageKind::Media {
                file_key,
                file_name,
            } => self.video(event, &file_key, &file_name, &mut out).await,
            MessageKind::Post { title, paragraphs } => {
                self.post(event, &title, &paragraphs, &mut out).await;
            }
            MessageKind::Other(message_type) => out.push(placeholder_for(&message_type)),
        }
        out.finish()
    }

    async fn image(&self, event: &InboundEvent, key: &str, instruction: &str, out: &mut Fragments) {
        let Some(path) = self
            .fetcher
            .fetch(&event.message_id, key, ResourceKind::Image, "")
            .await
        else {
            out.push("[image: download failed]");
            return;
        };
        out.push(format!("[image: {}]", path.display()));

        let analysis = match &self.describer {
            Some(describer) => describer.describe(&path, instruction).await,
            None => String::new(),
        };
        if analysis.is_empty() {
            out.attach(&path);
        } else {
            out.push(format!("[image_analysis: {analysis}]"));
        }
    }

    async fn file(&self, event: &InboundEvent, key: &str, name: &str, out: &mut Fragments) {
        if key.is_empty() {
            out.push("[file]");
            return;
        }
        match self
            .fetcher
            .fetch(&event.message_id, key, ResourceKind::File, name)
            .await
        {
            Some(path) => {
                out.attach(&path);
                out.push(format!("[file: {}]", path.display()));
            }
            None => out.push(format!("[file: download failed ({name})]")),
        }
    }

    async fn audio(&self, event: &InboundEvent, key: &str, out: &mut Fragments) {
        if key.is_empty() {
            out.push("[audio]");
            return;
        }
        let Some(path) = self
            .fetcher
            .fetch(&event.message_id, key, ResourceKind::Audio, "")
            .await
        else {
            out.push("[audio: download failed]");
            return;
        };
        out.push(format!("[audio: {}]", path.display()));

        let transcription = match &self.transcriber {
            Some(transcriber) => transcriber.transcribe(&path).await,
            None => String::new(),
        };
        if transcription.is_empty() {
            out.attach(&path);
        } else {
            out.push(format!("[transcription: {transcription}]"));
        }
    }

    async fn video(&self, event: &InboundEvent, key: &str, name: &str, out: &mut Fragments) {
        if key.is_empty() {
            out.push("[video]");
            return;
        }
        if !self.fetch_video(event, key, name, out).await {
            out.push("[video: download failed]");
        }
    }

    /// Returns false when the download failed; nothing is recorded in that case.
    async fn fetch_video(
        &self,
        event: &InboundEvent,
        key: &str,
        name: &str,
        out: &mut Fragments,
    ) -> bool {
        let Some(path) = self
            .fetcher
            .fetch(&event.message_id, key, ResourceKind::Media, name)
            .await
        else {
            return false;
        };
        out.attach(&path);
        out.push(format!("[video: {}]", path.display()));
        true
    }

    async fn post(
        &self,
        event: &InboundEvent,
        title: &str,
        paragraphs: &[Vec<PostElement>],
        out: &mut Fragments,
    ) {
        if !title.is_empty() {
            out.push(title);
        }
        for paragraph in paragraphs {
            let mut line = String::new();
            for element in paragraph {
                match element {
                    PostElement::Text(text) => line.push_str(text),
                    PostElement::Link { text, href } => {
                        if href.is_empty() {
                            line.push_str(text);
                        } else {
                            line.push_str(&format!("{text}({href})"));
                        }
                    }
                    PostElement::Image { image_key } if !image_key.is_empty() => {
                        self.image(event, image_key, title, out).await;
                    }
                    PostElement::Media {
                        file_key,
                        file_name,
                    } if !file_key.is_empty() => {
                        // inline video failures leave no marker
                        self.fetch_video(event, file_key, file_name, out).await;
                    }
                    PostElement::Emotion(emoji) => line.push_str(&format!("[{emoji}]")),
                    PostElement::At
                    | PostElement::Image { .. }
                    | PostElement::Media { .. }
                    | PostElement::Unknown => {}
                }
            }
            if line.is_empty() {
                continue;
            }
            let line = if event.is_group() {
                strip_feishu_mentions(&line)
            } else {
                line
            };
            if !line.is_empty() {
                out.push(line);
            }
        }
    }
}
