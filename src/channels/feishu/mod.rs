//! Feishu/Lark channel.
//!
//! Events arrive over the long connection (`ws`) on a worker thread and are
//! queued for a single consumer task, which drops duplicates and spawns one
//! processing task per message. Replies go out through the REST client (`api`).

pub mod api;
pub mod card;
pub mod commands;
pub mod dedup;
pub mod events;
pub mod media;
pub mod normalize;
pub mod ws;

#[cfg(test)]
mod mock;

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::channels::base::BaseChannel;
use crate::channels::utils::check_allowed_sender;
use crate::config::FeishuConfig;
use crate::providers::{ImageDescriber, Transcriber};
use crate::session::SessionStore;
use anyhow::{Context, Result};
use api::{LarkApi, LarkClient, LarkClientConfig, ReceiveIdType};
use async_trait::async_trait;
use commands::Command;
use dedup::DedupCache;
use events::InboundEvent;
use media::MediaFetcher;
use normalize::{Normalized, Normalizer};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use ws::{EventDispatcher, WsWorker};

const CHANNEL_NAME: &str = "feishu";

/// Optional collaborators. Each one missing degrades gracefully: images and audio
/// are forwarded as raw media, `/reset` answers that sessions are unavailable.
#[derive(Clone, Default)]
pub struct FeishuServices {
    pub image_describer: Option<Arc<dyn ImageDescriber>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub sessions: Option<Arc<dyn SessionStore>>,
}

#[derive(Default)]
struct ChannelState {
    api: Option<Arc<dyn LarkApi>>,
    shutdown: Option<watch::Sender<bool>>,
    worker: Option<std::thread::JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
}

pub struct FeishuChannel {
    config: FeishuConfig,
    bus: Arc<Mutex<MessageBus>>,
    services: FeishuServices,
    media_dir: Option<PathBuf>,
    running: AtomicBool,
    state: Mutex<ChannelState>,
}

impl FeishuChannel {
    pub fn new(
        config: FeishuConfig,
        bus: Arc<Mutex<MessageBus>>,
        services: FeishuServices,
    ) -> Self {
        Self {
            config,
            bus,
            services,
            media_dir: None,
            running: AtomicBool::new(false),
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Use an already constructed REST client and media directory instead of
    /// building them at start.
    pub fn with_api(
        config: FeishuConfig,
        bus: Arc<Mutex<MessageBus>>,
        services: FeishuServices,
        api: Arc<dyn LarkApi>,
        media_dir: PathBuf,
    ) -> Self {
        let mut channel = Self::new(config, bus, services);
        channel.media_dir = Some(media_dir);
        channel.state = Mutex::new(ChannelState {
            api: Some(api),
            ..Default::default()
        });
        channel
    }

    fn pipeline(&self, api: Arc<dyn LarkApi>, media_dir: PathBuf) -> Pipeline {
        let fetcher = MediaFetcher::new(api.clone(), media_dir);
        Pipeline {
            allow_from: Arc::new(self.config.allow_from.clone()),
            react_emoji: self.config.react_emoji.clone(),
            normalizer: Normalizer::new(
                fetcher,
                self.services.image_describer.clone(),
                self.services.transcriber.clone(),
            ),
            sessions: self.services.sessions.clone(),
            bus: self.bus.clone(),
            api,
        }
    }

    /// Spawn the websocket worker and the event consumer, recording their handles.
    async fn launch(&self) -> Result<()> {
        let api = self.connect().await?;
        let media_dir = match &self.media_dir {
            Some(dir) => dir.clone(),
            None => crate::utils::media::media_dir()?,
        };

        let (event_tx, event_rx) = mpsc::channel(self.config.event_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = WsWorker::new(
            LarkClientConfig::from_feishu(&self.config),
            EventDispatcher::new(event_tx),
            shutdown_rx,
        )
        .spawn()?;
        let consumer = tokio::spawn(consume(self.pipeline(api, media_dir), event_rx));

        let mut state = self.state.lock().await;
        state.shutdown = Some(shutdown_tx);
        state.worker = Some(worker);
        state.consumer = Some(consumer);
        Ok(())
    }

    async fn connect(&self) -> Result<Arc<dyn LarkApi>> {
        if let Some(api) = self.state.lock().await.api.clone() {
            return Ok(api);
        }
        let client_config = LarkClientConfig::from_feishu(&self.config);
        let client = tokio::task::spawn_blocking(move || LarkClient::new(client_config))
            .await
            .context("Feishu client construction panicked")??;
        let api: Arc<dyn LarkApi> = Arc::new(client);
        self.state.lock().await.api = Some(api.clone());
        Ok(api)
    }
}

#[async_trait]
impl BaseChannel for FeishuChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<()> {
        if self.config.app_id.is_empty() || self.config.app_secret.is_empty() {
            error!("Feishu app_id and app_secret not configured");
            return Ok(());
        }

        // set before spawning so a concurrent stop is observed below
        self.running.store(true, Ordering::SeqCst);
        if let Err(e) = self.launch().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        if !self.running.load(Ordering::SeqCst) {
            debug!("Feishu channel stopped while starting");
            return self.stop().await;
        }
        info!("Feishu channel started with long connection");

        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let (shutdown, worker, consumer) = {
            let mut state = self.state.lock().await;
            (
                state.shutdown.take(),
                state.worker.take(),
                state.consumer.take(),
            )
        };

        if let Some(shutdown) = shutdown
            && shutdown.send(true).is_err()
        {
            warn!("Error stopping Feishu websocket: worker already gone");
        }
        if let Some(worker) = worker {
            let joined = tokio::time::timeout(
                Duration::from_secs(5),
                tokio::task::spawn_blocking(move || worker.join()),
            )
            .await;
            match joined {
                Ok(Ok(Ok(()))) => {}
                Ok(_) => warn!("Feishu websocket worker panicked"),
                Err(_) => warn!("Feishu websocket worker did not exit in time"),
            }
        }
        // drains once the worker has dropped the queue sender
        if let Some(consumer) = consumer
            && tokio::time::timeout(Duration::from_secs(5), consumer)
                .await
                .is_err()
        {
            warn!("Feishu event consumer did not exit in time");
        }
        info!("Feishu channel stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let Some(api) = self.state.lock().await.api.clone() else {
            warn!("Feishu client not initialized");
            return Ok(());
        };

        if !msg.media.is_empty() {
            info!(
                "Sending message with {} media files to {}",
                msg.media.len(),
                msg.chat_id
            );
            for path in &msg.media {
                if let Some((msg_type, content)) =
                    media::upload_attachment(api.clone(), PathBuf::from(path)).await
                {
                    deliver(api.clone(), &msg.chat_id, msg_type, content).await;
                }
            }
        }

        if !msg.content.is_empty() {
            let card = card::build_card(&msg.content).to_string();
            deliver(api, &msg.chat_id, "interactive", card).await;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Send one message on the blocking pool. Failures are logged.
async fn deliver(api: Arc<dyn LarkApi>, receive_id: &str, msg_type: &'static str, content: String) {
    let id_type = ReceiveIdType::for_target(receive_id);
    let target = receive_id.to_string();
    let result = tokio::task::spawn_blocking(move || {
        api.send_message(id_type, &target, msg_type, &content)
    })
    .await;
    match result {
        Ok(Ok(())) => debug!("Feishu {} message sent to {}", msg_type, receive_id),
        Ok(Err(e)) => error!("Failed to send Feishu {} message: {:#}", msg_type, e),
        Err(e) => error!("Feishu send task failed: {}", e),
    }
}

/// Sole owner of the dedup cache. Each admitted event is processed on its own task.
async fn consume(pipeline: Pipeline, mut events: mpsc::Receiver<InboundEvent>) {
    let mut seen = DedupCache::default();
    while let Some(event) = events.recv().await {
        if !seen.check_and_insert(&event.message_id) {
            debug!("duplicate Feishu message {}", event.message_id);
            continue;
        }
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.process(event).await });
    }
    debug!("Feishu event queue closed");
}

/// Per-message processing after deduplication.
#[derive(Clone)]
struct Pipeline {
    allow_from: Arc<Vec<String>>,
    react_emoji: String,
    normalizer: Normalizer,
    sessions: Option<Arc<dyn SessionStore>>,
    bus: Arc<Mutex<MessageBus>>,
    api: Arc<dyn LarkApi>,
}

impl Pipeline {
    async fn process(&self, event: InboundEvent) {
        if event.is_from_bot() {
            return;
        }
        if !check_allowed_sender(&event.sender_id, &self.allow_from) {
            debug!("Feishu sender {} not in allowFrom, dropping", event.sender_id);
            return;
        }
        if event.is_group() && event.mention_count == 0 {
            return;
        }

        self.react(&event.message_id).await;

        match self.normalizer.normalize(&event).await {
            Normalized::Skip => {}
            Normalized::Command(command) => self.answer(command, &event).await,
            Normalized::Forward { content, media } => self.forward(&event, content, media).await,
        }
    }

    async fn react(&self, message_id: &str) {
        let api = self.api.clone();
        let message_id = message_id.to_string();
        let emoji = self.react_emoji.clone();
        let result =
            tokio::task::spawn_blocking(move || api.add_reaction(&message_id, &emoji)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to add reaction: {:#}", e),
            Err(e) => warn!("Reaction task failed: {}", e),
        }
    }

    async fn answer(&self, command: Command, event: &InboundEvent) {
        let reply_to = event.reply_to();
        let session_key = format!("{}:{}", CHANNEL_NAME, reply_to);
        match command.execute(self.sessions.as_deref(), &session_key).await {
            Ok(reply) => {
                let content = json!({ "text": reply }).to_string();
                deliver(self.api.clone(), reply_to, "text", content).await;
            }
            Err(e) => error!("Failed to run {:?} for {}: {:#}", command, session_key, e),
        }
    }

    async fn forward(&self, event: &InboundEvent, content: String, media: Vec<String>) {
        debug!(
            "Feishu message from {} ({}): {}",
            event.sender_id,
            event.message_type,
            crate::utils::preview(&content, 80)
        );
        let mut msg = InboundMessage::new(
            CHANNEL_NAME,
            event.sender_id.as_str(),
            event.reply_to(),
            content,
        );
        msg.media = media;
        msg.metadata = HashMap::from([
            ("message_id".to_string(), json!(event.message_id)),
            ("chat_type".to_string(), json!(event.chat_type)),
            ("msg_type".to_string(), json!(event.message_type)),
        ]);

        if let Err(e) = self.bus.lock().await.publish_inbound(msg).await {
            error!("Failed to forward Feishu message {}: {:#}", event.message_id, e);
        }
    }
}
