//! Utility functions for channel implementations

/// Check a sender against a channel's allow list.
///
/// An empty list or a `"*"` entry admits everyone; otherwise the sender must be listed.
pub fn check_allowed_sender(sender: &str, allow_list: &[String]) -> bool {
    if allow_list.is_empty() || allow_list.iter().any(|a| a == "*") {
        return true;
    }
    allow_list.iter().any(|allowed| allowed.trim() == sender)
}

#[cfg(test)]
mod tests;
