use super::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock channel whose `start` parks until `stop` is called.
struct MockChannel {
    channel_name: String,
    fail_send: bool,
    running: AtomicBool,
    stopped: tokio::sync::Notify,
    send_attempts: AtomicUsize,
}

impl MockChannel {
    fn new(name: &str, fail_send: bool) -> Arc<Self> {
        Arc::new(Self {
            channel_name: name.to_string(),
            fail_send,
            running: AtomicBool::new(false),
            stopped: tokio::sync::Notify::new(),
            send_attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BaseChannel for MockChannel {
    fn name(&self) -> &str {
        &self.channel_name
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.stopped.notified().await;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.notify_one();
        Ok(())
    }

    async fn send(&self, _msg: &OutboundMessage) -> anyhow::Result<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_send {
            Err(anyhow::anyhow!("mock send failure"))
        } else {
            Ok(())
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_send_no_matching_channel() {
    let mgr = ChannelManager::with_channels(vec![]);
    let err = mgr
        .send(&OutboundMessage::text("nonexistent", "c", "hi"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No channel found"));
}

#[tokio::test]
async fn test_send_routes_by_name() {
    let a = MockChannel::new("feishu", false);
    let b = MockChannel::new("other", false);
    let mgr = ChannelManager::with_channels(vec![a.clone(), b.clone()]);
    mgr.send(&OutboundMessage::text("feishu", "oc_1", "hi"))
        .await
        .unwrap();
    assert_eq!(a.send_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(b.send_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_send_failure_is_not_retried() {
    let ch = MockChannel::new("feishu", true);
    let mgr = ChannelManager::with_channels(vec![ch.clone()]);
    assert!(
        mgr.send(&OutboundMessage::text("feishu", "oc_1", "hi"))
            .await
            .is_ok()
    );
    assert_eq!(ch.send_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_and_stop_all() {
    let ch = MockChannel::new("feishu", false);
    let mgr = ChannelManager::with_channels(vec![ch.clone()]);
    mgr.start_all().await;

    for _ in 0..50 {
        if ch.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ch.is_running());

    mgr.stop_all().await;
    assert!(!ch.is_running());
    assert!(mgr.tasks.lock().await.is_empty());
}

#[test]
fn test_disabled_feishu_creates_no_channels() {
    let bus = Arc::new(Mutex::new(MessageBus::default()));
    let mgr = ChannelManager::new(&Config::default(), bus, FeishuServices::default());
    assert!(mgr.enabled_channels().is_empty());
}
