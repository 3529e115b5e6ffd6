use crate::bus::{InboundMessage, OutboundMessage};
use crate::config::BusConfig;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_OUTBOUND_RATE_LIMIT: usize = 60;
/// Upper bound on a single enqueue when the consumer has stalled.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Tracked keys beyond this count trigger a prune of idle entries.
const MAX_TRACKED_ENDPOINTS: usize = 5000;

/// Per-key sliding window of recent send instants.
#[derive(Debug)]
struct SlidingWindow {
    limit: usize,
    window: Duration,
    hits: HashMap<String, Vec<Instant>>,
}

impl SlidingWindow {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: HashMap::new(),
        }
    }

    /// Records a hit for `key`, or returns false when the key is over its limit.
    fn admit(&mut self, key: &str) -> bool {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.window).unwrap_or(now);
        let stamps = self.hits.entry(key.to_string()).or_default();
        stamps.retain(|&t| t > cutoff);
        if stamps.len() >= self.limit {
            return false;
        }
        stamps.push(now);

        if self.hits.len() > MAX_TRACKED_ENDPOINTS {
            let window = self.window;
            self.hits
                .retain(|_, ts| ts.iter().any(|&t| now.duration_since(t) < window));
        }
        true
    }
}

pub struct MessageBus {
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
    pub outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Option<mpsc::Receiver<OutboundMessage>>,
    inbound_limiter: SlidingWindow,
    outbound_limiter: SlidingWindow,
}

impl MessageBus {
    pub fn new(
        rate_limit: usize,
        rate_window_secs: f64,
        inbound_capacity: usize,
        outbound_capacity: usize,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        let window = Duration::from_secs_f64(rate_window_secs.max(0.0));
        Self {
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            inbound_limiter: SlidingWindow::new(rate_limit, window),
            outbound_limiter: SlidingWindow::new(DEFAULT_OUTBOUND_RATE_LIMIT, window),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(
            config.rate_limit,
            config.rate_window_secs,
            config.inbound_capacity,
            config.outbound_capacity,
        )
    }

    /// Extract the inbound receiver to avoid holding lock during await
    pub fn take_inbound_rx(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }

    /// Extract the outbound receiver to avoid holding lock during await
    pub fn take_outbound_rx(&mut self) -> Option<mpsc::Receiver<OutboundMessage>> {
        self.outbound_rx.take()
    }

    pub async fn publish_inbound(&mut self, msg: InboundMessage) -> Result<()> {
        let key = format!("{}:{}", msg.channel, msg.sender_id);
        if !self.inbound_limiter.admit(&key) {
            warn!(
                "rate limit hit for {} ({}/{:.0}s), dropping message",
                key,
                self.inbound_limiter.limit,
                self.inbound_limiter.window.as_secs_f64()
            );
            return Err(anyhow::anyhow!("Rate limit exceeded for {}", key));
        }

        let channel = msg.channel.clone();
        let sender_id = msg.sender_id.clone();
        tokio::time::timeout(SEND_TIMEOUT, self.inbound_tx.send(msg))
            .await
            .map_err(|_| {
                warn!(
                    "inbound send timed out after {}s, queue full",
                    SEND_TIMEOUT.as_secs()
                );
                anyhow::anyhow!("inbound send timed out: queue full")
            })?
            .context("Failed to send inbound message - receiver closed")?;
        debug!(
            "inbound message queued: channel={}, sender={}",
            channel, sender_id
        );
        Ok(())
    }

    pub async fn publish_outbound(&mut self, msg: OutboundMessage) -> Result<()> {
        let key = format!("{}:{}", msg.channel, msg.chat_id);
        if !self.outbound_limiter.admit(&key) {
            warn!(
                "outbound rate limit hit for {} ({}/{:.0}s), dropping message",
                key,
                self.outbound_limiter.limit,
                self.outbound_limiter.window.as_secs_f64()
            );
            return Err(anyhow::anyhow!("Outbound rate limit exceeded for {}", key));
        }

        let channel = msg.channel.clone();
        let chat_id = msg.chat_id.clone();
        tokio::time::timeout(SEND_TIMEOUT, self.outbound_tx.send(msg))
            .await
            .map_err(|_| {
                warn!(
                    "outbound send timed out after {}s, queue full",
                    SEND_TIMEOUT.as_secs()
                );
                anyhow::anyhow!("outbound send timed out: queue full")
            })?
            .context("Failed to send outbound message - receiver closed")?;
        debug!(
            "outbound message queued: channel={}, chat_id={}",
            channel, chat_id
        );
        Ok(())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::from_config(&BusConfig::default())
    }
}
