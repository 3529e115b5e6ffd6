pub mod credentials;
pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    BusConfig, ChannelsConfig, Config, FeishuConfig, ImageParserConfig, ProviderConfig,
    ProvidersConfig,
};
