//! Input validation utilities.
//!
//! This module contains functions for validating startup settings before they are frozen into
//! [`crate::NotifierConfig`].

use crate::{NotifierError, NotifierResult};

/// Validates that a trigger word is usable as the first token of a chat message.
///
/// Messages are tokenised on whitespace, so a trigger containing whitespace could never match.
///
/// # Errors
///
/// Returns a `NotifierError::InvalidInput` if the trigger is empty, too long, or contains
/// whitespace or control characters.
pub fn validate_trigger_word(trigger: &str) -> NotifierResult<()> {
    const MAX_TRIGGER_LEN: usize = 32;

    if trigger.is_empty() {
        return Err(NotifierError::InvalidInput(
            "trigger word cannot be empty".into(),
        ));
    }

    if trigger.chars().count() > MAX_TRIGGER_LEN {
        return Err(NotifierError::InvalidInput(format!(
            "trigger word exceeds maximum length of {} characters",
            MAX_TRIGGER_LEN
        )));
    }

    if trigger
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(NotifierError::InvalidInput(
            "trigger word must not contain whitespace or control characters".into(),
        ));
    }

    Ok(())
}

/// Validates that a URL uses http or https and has something after the scheme.
///
/// # Errors
///
/// Returns a `NotifierError::InvalidInput` otherwise.
pub fn validate_base_url(url: &str) -> NotifierResult<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));

    match rest {
        Some(host) if !host.trim().is_empty() && !host.contains(char::is_whitespace) => Ok(()),
        _ => Err(NotifierError::InvalidInput(format!(
            "URL must start with http:// or https://: {url:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_words() {
        assert!(validate_trigger_word("!vaccine").is_ok());
        assert!(validate_trigger_word("").is_err());
        assert!(validate_trigger_word("!vac cine").is_err());
        assert!(validate_trigger_word(&"x".repeat(33)).is_err());
    }

    #[test]
    fn base_urls() {
        assert!(validate_base_url("https://cdn-api.co-vin.in/api/v2").is_ok());
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("https://").is_err());
        assert!(validate_base_url("cdn-api.co-vin.in").is_err());
    }
}
