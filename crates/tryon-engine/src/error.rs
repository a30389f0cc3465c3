use std::time::Duration;

use thiserror::Error;

use crate::session::ImageSlot;

pub type Result<T, E = TryOnError> = std::result::Result<T, E>;

/// Every failure the try-on pipeline can surface to its caller.
#[derive(Debug, Error)]
pub enum TryOnError {
    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("invalid image url (expected http:// or https://): {url:?}")]
    InvalidUrl { url: String },

    #[error("image fetch failed with status {status}")]
    Fetch { status: u16 },

    #[error("missing {0} image")]
    MissingInput(ImageSlot),

    #[error("a try-on request is already in flight")]
    AlreadyInFlight,

    #[error("request timed out after {}ms", .timeout.as_millis())]
    Timeout { timeout: Duration },

    #[error("{message}")]
    Api { message: String },

    #[error("response did not contain a result image")]
    MissingResult,

    #[error("network error: {message}")]
    Transport { message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TryOnError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Maps a client error, keeping timeouts distinguishable from other
    /// transport failures.
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) if err.is_timeout() => Self::Timeout { timeout },
            _ => Self::Transport {
                message: error_chain_text(&err),
            },
        }
    }

    /// Re-entrant triggers are swallowed upstream rather than shown.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::AlreadyInFlight)
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Decode(_) => "Could not read that image. Please choose another one.".to_string(),
            Self::InvalidUrl { .. } => {
                "Please enter a valid URL (http:// or https://).".to_string()
            }
            Self::Fetch { status } => format!("Image load failed: {status}"),
            Self::MissingInput(ImageSlot::Person) => "Please select your photo first.".to_string(),
            Self::MissingInput(ImageSlot::Garment) => {
                "Please select a garment image first.".to_string()
            }
            Self::AlreadyInFlight => "A try-on is already running.".to_string(),
            Self::Timeout { timeout } => format!(
                "The request timed out after {}s. Please try again.",
                timeout.as_secs()
            ),
            Self::Api { message } => format!("Try-on failed: {message}"),
            Self::MissingResult => "Try-on failed: the server returned no result image.".to_string(),
            Self::Transport { message } => format!("Network error: {message}"),
            Self::Config(message) => format!("Configuration error: {message}"),
        }
    }

    /// Short stable tag used in the session event log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Fetch { .. } => "fetch",
            Self::MissingInput(_) => "missing_input",
            Self::AlreadyInFlight => "already_in_flight",
            Self::Timeout { .. } => "timeout",
            Self::Api { .. } => "api",
            Self::MissingResult => "missing_result",
            Self::Transport { .. } => "transport",
            Self::Config(_) => "config",
        }
    }
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    parts.join(" | caused by: ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::TryOnError;
    use crate::session::ImageSlot;

    #[test]
    fn timeout_message_is_distinct_from_api_message() {
        let timeout = TryOnError::Timeout {
            timeout: Duration::from_millis(120_000),
        };
        assert_eq!(timeout.to_string(), "request timed out after 120000ms");
        assert_eq!(
            timeout.user_message(),
            "The request timed out after 120s. Please try again."
        );

        let api = TryOnError::api("bad category");
        assert_eq!(api.to_string(), "bad category");
        assert_eq!(api.user_message(), "Try-on failed: bad category");
        assert_ne!(timeout.kind(), api.kind());
    }

    #[test]
    fn already_in_flight_is_not_user_facing() {
        assert!(!TryOnError::AlreadyInFlight.is_user_facing());
        assert!(TryOnError::MissingInput(ImageSlot::Garment).is_user_facing());
        assert_eq!(
            TryOnError::MissingInput(ImageSlot::Person).to_string(),
            "missing person image"
        );
    }
}
