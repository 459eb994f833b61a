use crate::error::{BrokerError, Result};

/// Maximum length of a topic name in characters.
pub const MAX_TOPIC_NAME_LEN: usize = 255;

/// Prefix reserved for internal topics.
const RESERVED_PREFIX: &str = "__";

/// Validate a topic name: non-empty, at most 255 characters, restricted
/// to `[A-Za-z0-9_-]`, and not starting with the reserved `__` prefix.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BrokerError::InvalidArgument(
            "topic name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_TOPIC_NAME_LEN {
        return Err(BrokerError::InvalidArgument(format!(
            "topic name exceeds {MAX_TOPIC_NAME_LEN} characters"
        )));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(BrokerError::InvalidArgument(format!(
            "topic name '{name}' uses the reserved '{RESERVED_PREFIX}' prefix"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(BrokerError::InvalidArgument(format!(
            "topic name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}
