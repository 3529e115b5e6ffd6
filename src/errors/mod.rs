use thiserror::Error;

/// Typed error hierarchy for the Feishu bridge.
///
/// Use at module boundaries (config validation, vendor API calls, providers, sessions).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum NanobotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Channel error: {channel}: {message}")]
    Channel { channel: String, message: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `NanobotError`.
pub type NanobotResult<T> = std::result::Result<T, NanobotError>;

impl NanobotError {
    /// Build a channel error for the Feishu vendor API.
    pub fn feishu(message: impl Into<String>) -> Self {
        Self::Channel {
            channel: "feishu".to_string(),
            message: message.into(),
        }
    }

    /// Whether this error is transient and the operation could be retried by a caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Internal(_) => true,
            Self::Config(_) | Self::Channel { .. } | Self::Session(_) => false,
        }
    }
}

#[cfg(test)]
mod tests;
