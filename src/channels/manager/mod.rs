use crate::bus::{MessageBus, OutboundMessage};
use crate::channels::base::BaseChannel;
use crate::channels::feishu::{FeishuChannel, FeishuServices};
use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long `stop_all` waits for each channel's `start` future to return.
const STOP_GRACE: Duration = Duration::from_secs(5);

pub struct ChannelManager {
    channels: Vec<Arc<dyn BaseChannel>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelManager {
    pub fn new(config: &Config, bus: Arc<Mutex<MessageBus>>, services: FeishuServices) -> Self {
        let mut channels: Vec<Arc<dyn BaseChannel>> = Vec::new();

        if config.channels.feishu.enabled {
            tracing::debug!("Initializing Feishu channel...");
            channels.push(Arc::new(FeishuChannel::new(
                config.channels.feishu.clone(),
                bus,
                services,
            )));
            tracing::info!("Feishu channel enabled");
        }

        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Arc<dyn BaseChannel>>) -> Self {
        Self {
            channels,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn enabled_channels(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Start every channel on its own task. A channel whose `start` fails is
    /// logged and left stopped; the others keep running.
    pub async fn start_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for channel in &self.channels {
            let channel = channel.clone();
            tracing::info!("Starting channel: {}", channel.name());
            tasks.push(tokio::spawn(async move {
                if let Err(e) = channel.start().await {
                    tracing::error!("Channel {} failed: {:#}", channel.name(), e);
                }
            }));
        }
    }

    pub async fn stop_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.stop().await {
                tracing::warn!("Error stopping channel {}: {}", channel.name(), e);
            }
        }
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                tracing::warn!("channel task did not exit within {}s", STOP_GRACE.as_secs());
            }
        }
    }

    /// Route an outbound message to its channel. Delivery failures are logged, not retried.
    pub async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        tracing::debug!(
            "ChannelManager.send: channel={}, chat_id={}, content_len={}",
            msg.channel,
            msg.chat_id,
            msg.content.len()
        );
        let Some(channel) = self.channels.iter().find(|c| c.name() == msg.channel) else {
            tracing::error!(
                "No channel found for: {} (available channels: {:?})",
                msg.channel,
                self.enabled_channels()
            );
            return Err(anyhow::anyhow!("No channel found for: {}", msg.channel));
        };

        if let Err(e) = channel.send(msg).await {
            tracing::error!("Error sending message to {} channel: {:#}", msg.channel, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
