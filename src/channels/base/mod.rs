use crate::bus::OutboundMessage;
use async_trait::async_trait;

/// A chat platform adapter.
///
/// `start` runs for the channel's whole lifetime and returns once `stop` has been
/// called, so both take `&self` and implementations keep their state behind
/// interior mutability.
#[async_trait]
pub trait BaseChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;

    fn is_running(&self) -> bool;
}
