//! Custom error types for dinkbot.
//!
//! Every fallible operation in the crate returns [`BotError`]. The command
//! dispatcher turns these into user-visible replies, so none of them end the
//! process once the bot is running.

use std::fmt;

/// Main error type for dinkbot operations.
#[derive(Debug)]
pub enum BotError {
    /// Configuration errors (missing env vars, invalid values)
    Config(String),
    /// Database or event recorder failures
    Persistence(String),
    /// A hosted API (chat, image, weather) rejected the request
    Upstream(String),
    /// A hosted API could not be reached or is overloaded; worth retrying
    Unavailable(String),
    /// A collaborator call did not finish within the configured timeout
    Timeout(String),
    /// A usage quota was exhausted before the call was made
    QuotaExceeded(String),
    /// User supplied arguments that do not fit the command
    InvalidArguments(String),
    /// Discord gateway or framework errors
    Discord(String),
    /// Generic I/O errors
    Io(std::io::Error),
}

impl BotError {
    /// Whether retrying the same upstream request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            Self::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            Self::Unavailable(msg) => write!(f, "Upstream unavailable: {}", msg),
            Self::Timeout(msg) => write!(f, "Timed out: {}", msg),
            Self::QuotaExceeded(msg) => write!(f, "Quota exceeded: {}", msg),
            Self::InvalidArguments(msg) => write!(f, "Invalid arguments: {}", msg),
            Self::Discord(msg) => write!(f, "Discord error: {}", msg),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for BotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BotError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<rusqlite::Error> for BotError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .is_some_and(|s| s.is_server_error() || s.as_u16() == 429);
        if transient {
            Self::Unavailable(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Upstream(format!("JSON parsing error: {}", err))
    }
}

impl From<std::env::VarError> for BotError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BotError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Persistence(format!("Task join error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for BotError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(err.to_string())
    }
}

/// Result type alias for dinkbot operations.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BotError::Timeout("chat".to_string()).is_transient());
        assert!(BotError::Unavailable("503 Service Unavailable".to_string()).is_transient());
        assert!(!BotError::Upstream("bad request".to_string()).is_transient());
        assert!(!BotError::QuotaExceeded("chat".to_string()).is_transient());
    }

    #[test]
    fn test_display_prefixes() {
        let err = BotError::InvalidArguments("prompt is empty".to_string());
        assert_eq!(err.to_string(), "Invalid arguments: prompt is empty");

        let err = BotError::Persistence("disk full".to_string());
        assert_eq!(err.to_string(), "Persistence error: disk full");
    }
}
