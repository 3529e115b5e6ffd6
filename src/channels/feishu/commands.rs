//! Slash commands answered by the channel itself instead of being forwarded.

use crate::session::SessionStore;
use anyhow::Result;
use tracing::info;

pub const HELP_TEXT: &str = "nanobot commands\n\n\
/reset - clear the conversation history\n\
/help - show this help\n\n\
Send any other message to start chatting.";

pub const SESSIONS_UNAVAILABLE: &str = "session management unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Help,
}

impl Command {
    /// Recognize the first whitespace-separated token, case-insensitively.
    /// Unknown commands return `None` and are forwarded as ordinary text.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?.to_lowercase();
        match token.as_str() {
            "/reset" => Some(Self::Reset),
            "/help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Run the command and return the reply text.
    pub async fn execute(
        self,
        sessions: Option<&dyn SessionStore>,
        session_key: &str,
    ) -> Result<String> {
        match self {
            Self::Help => Ok(HELP_TEXT.to_string()),
            Self::Reset => {
                let Some(store) = sessions else {
                    return Ok(SESSIONS_UNAVAILABLE.to_string());
                };
                let mut session = store.get_or_create(session_key).await?;
                let cleared = session.clear();
                store.save(&session).await?;
                info!(
                    "session reset for {} (cleared {} messages)",
                    session_key, cleared
                );
                Ok(format!(
                    "Conversation history cleared ({cleared} messages). Let's start over!"
                ))
            }
        }
    }
}
