//! Error types for StreamChat
//!
//! This module defines the error taxonomy used throughout the streaming
//! engine, using `thiserror` for ergonomic error handling. Transport-level
//! failures are reclassified into these variants at the provider boundary so
//! callers never see raw I/O or HTTP client error types.

use thiserror::Error;

/// Main error type for StreamChat operations
///
/// Network and HTTP failures carry the fields needed to render a
/// kind-specific message to the user. `Cancelled` is a distinct terminal
/// state and is never rendered as an error.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The request or a stream read exceeded its deadline
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// DNS resolution or TCP/TLS connect failure
    #[error("Network connection failed: {0}")]
    NetworkConnection(String),

    /// Non-2xx response that does not fall into a more specific bucket
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// 401/403 responses
    #[error("Authentication failed (HTTP {status}): {body}")]
    Authentication {
        /// Response status code
        status: u16,
        /// Response body
        body: String,
    },

    /// 429 responses
    #[error("Rate limited (HTTP {status}): {body}")]
    RateLimit {
        /// Response status code
        status: u16,
        /// Response body
        body: String,
    },

    /// 5xx responses
    #[error("Server error (HTTP {status}): {body}")]
    ServerError {
        /// Response status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Malformed parameters, empty mandatory body, or unexpected JSON shape
    #[error("Request error: {0}")]
    Request(String),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Anything that could not be classified
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence gateway failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for StreamChat library operations
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Classify a non-success HTTP status and its body
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::error::ChatError;
    ///
    /// let err = ChatError::from_status(429, "slow down".to_string());
    /// assert!(matches!(err, ChatError::RateLimit { status: 429, .. }));
    /// ```
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ChatError::Authentication { status, body },
            429 => ChatError::RateLimit { status, body },
            500..=599 => ChatError::ServerError { status, body },
            _ => ChatError::HttpStatus { status, body },
        }
    }

    /// Returns true for the cancellation terminal state
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }

    /// Status code carried by HTTP-derived variants
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::HttpStatus { status, .. }
            | ChatError::Authentication { status, .. }
            | ChatError::RateLimit { status, .. }
            | ChatError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Render a user-actionable message for this error
    ///
    /// Every variant is matched explicitly so new kinds cannot silently fall
    /// through to a generic message.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::NetworkTimeout(_) => {
                "The provider took too long to respond. Check your connection and try again."
                    .to_string()
            }
            ChatError::NetworkConnection(_) => {
                "Could not reach the provider. Check the base URL, proxy, and your network."
                    .to_string()
            }
            ChatError::HttpStatus { status, body } => {
                format!("The provider returned HTTP {}: {}", status, truncate(body))
            }
            ChatError::Authentication { status, .. } => format!(
                "Authentication failed (HTTP {}). Check your API key.",
                status
            ),
            ChatError::RateLimit { .. } => {
                "Rate limit reached. Please retry later or add another API key.".to_string()
            }
            ChatError::ServerError { status, .. } => format!(
                "The provider is having trouble (HTTP {}). Retry later.",
                status
            ),
            ChatError::Request(msg) => format!("The request was rejected: {}", msg),
            ChatError::Cancelled => "Generation cancelled.".to_string(),
            ChatError::Unknown(msg) => format!("Unexpected error: {}", msg),
            ChatError::Config(msg) => format!("Configuration problem: {}", msg),
            ChatError::Storage(msg) => format!("Could not save the conversation: {}", msg),
            ChatError::Io(e) => format!("I/O failure: {}", e),
            ChatError::Yaml(e) => format!("Configuration file is invalid: {}", e),
        }
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::NetworkTimeout(err.to_string())
        } else if err.is_connect() {
            ChatError::NetworkConnection(err.to_string())
        } else if let Some(status) = err.status() {
            ChatError::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() || err.is_body() || err.is_builder() {
            ChatError::Request(err.to_string())
        } else {
            ChatError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Request(format!("unexpected JSON: {}", err))
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_authentication() {
        assert!(matches!(
            ChatError::from_status(401, "bad key".into()),
            ChatError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            ChatError::from_status(403, String::new()),
            ChatError::Authentication { status: 403, .. }
        ));
    }

    #[test]
    fn test_from_status_rate_limit_and_server() {
        assert!(matches!(
            ChatError::from_status(429, String::new()),
            ChatError::RateLimit { .. }
        ));
        assert!(matches!(
            ChatError::from_status(503, String::new()),
            ChatError::ServerError { status: 503, .. }
        ));
    }

    #[test]
    fn test_from_status_other_keeps_body() {
        match ChatError::from_status(404, "no such model".into()) {
            ChatError::HttpStatus { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such model");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_user_message_is_actionable() {
        let auth = ChatError::from_status(401, String::new());
        assert!(auth.user_message().contains("API key"));

        let rate = ChatError::from_status(429, String::new());
        assert!(rate.user_message().contains("retry later"));
    }

    #[test]
    fn test_user_message_truncates_long_bodies() {
        let err = ChatError::HttpStatus {
            status: 418,
            body: "x".repeat(1000),
        };
        assert!(err.user_message().chars().count() < 300);
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(ChatError::from_status(500, String::new()).status(), Some(500));
        assert_eq!(ChatError::Cancelled.status(), None);
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(ChatError::Cancelled.is_cancelled());
        assert!(!ChatError::Unknown("x".into()).is_cancelled());
    }

    #[test]
    fn test_json_error_becomes_request_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: ChatError = json_error.into();
        assert!(matches!(err, ChatError::Request(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ChatError = io_error.into();
        assert!(matches!(error, ChatError::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChatError>();
    }
}
