use serde::{Deserialize, Serialize};

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`            : printed normally via `&self.field_name`
/// - `redact(field_name)`    : `String` field: shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

// Submodules are declared after the macro so they can use `redact_debug!`
mod channels;
mod providers;

pub use channels::*;
pub use providers::*;

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

fn default_bus_capacity() -> usize {
    1000
}

fn default_rate_limit() -> usize {
    30
}

fn default_rate_window_secs() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_capacity", rename = "inboundCapacity")]
    pub inbound_capacity: usize,
    #[serde(default = "default_bus_capacity", rename = "outboundCapacity")]
    pub outbound_capacity: usize,
    /// Inbound messages allowed per sender within `rate_window_secs`.
    #[serde(default = "default_rate_limit", rename = "rateLimit")]
    pub rate_limit: usize,
    #[serde(default = "default_rate_window_secs", rename = "rateWindowSecs")]
    pub rate_window_secs: f64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_bus_capacity(),
            outbound_capacity: default_bus_capacity(),
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), crate::errors::NanobotError> {
        self.validate_bus()?;
        self.validate_channels()?;
        self.validate_providers()?;
        Ok(())
    }

    fn validate_bus(&self) -> Result<(), crate::errors::NanobotError> {
        use crate::errors::NanobotError;
        let b = &self.bus;

        if b.inbound_capacity == 0 {
            return Err(NanobotError::Config(
                "bus.inboundCapacity must be > 0".into(),
            ));
        }
        if b.outbound_capacity == 0 {
            return Err(NanobotError::Config(
                "bus.outboundCapacity must be > 0".into(),
            ));
        }
        if b.rate_limit == 0 {
            return Err(NanobotError::Config("bus.rateLimit must be > 0".into()));
        }
        if !b.rate_window_secs.is_finite() || b.rate_window_secs <= 0.0 {
            return Err(NanobotError::Config(
                "bus.rateWindowSecs must be a positive number".into(),
            ));
        }
        Ok(())
    }

    fn validate_channels(&self) -> Result<(), crate::errors::NanobotError> {
        use crate::errors::NanobotError;
        let f = &self.channels.feishu;

        if !f.enabled {
            return Ok(());
        }
        if f.app_id.is_empty() || f.app_secret.is_empty() {
            return Err(NanobotError::Config(
                "channels.feishu is enabled but appId/appSecret is empty".into(),
            ));
        }
        if f.event_queue_capacity == 0 {
            return Err(NanobotError::Config(
                "channels.feishu.eventQueueCapacity must be > 0".into(),
            ));
        }
        if url::Url::parse(&f.domain).is_err() {
            return Err(NanobotError::Config(format!(
                "channels.feishu.domain is not a valid URL: {}",
                f.domain
            )));
        }
        Ok(())
    }

    fn validate_providers(&self) -> Result<(), crate::errors::NanobotError> {
        use crate::errors::NanobotError;
        let p = &self.providers.image_parser;

        if !p.enabled {
            return Ok(());
        }
        if p.api_base.trim().is_empty() {
            return Err(NanobotError::Config(
                "providers.imageParser is enabled but apiBase is empty".into(),
            ));
        }
        if p.model.trim().is_empty() {
            return Err(NanobotError::Config(
                "providers.imageParser is enabled but model is empty".into(),
            ));
        }
        if p.max_tokens == 0 {
            return Err(NanobotError::Config(
                "providers.imageParser.maxTokens must be > 0".into(),
            ));
        }
        if p.timeout_seconds == 0 {
            return Err(NanobotError::Config(
                "providers.imageParser.timeoutSeconds must be > 0".into(),
            ));
        }
        Ok(())
    }
}
