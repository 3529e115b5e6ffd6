pub mod base;
pub mod feishu;
pub mod manager;
pub mod utils;

pub use base::BaseChannel;
pub use manager::ChannelManager;
