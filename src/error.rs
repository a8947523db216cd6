//! Error types for ChatDeck
//!
//! All library operations return [`Result`], backed by the [`DeckError`] enum.
//! Model backend failures are additionally classified through [`ProviderError`]
//! so callers can tell transient failures from permanent ones.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Classification of model backend failures.
#[derive(Debug)]
pub enum ProviderError {
    /// 401/403 - rejected API key
    Auth(String),
    /// 429 - backend is throttling requests
    RateLimit(String),
    /// 5xx - backend-side failure
    ServerError(String),
    /// 400 - malformed request (bad model name, oversized context, ...)
    InvalidRequest(String),
    /// 404 - wrong endpoint URL or unknown model
    NotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Response body was not a decodable chat completion
    Decode(String),
    /// Anything else
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::NotFound(msg) => write!(f, "Endpoint or model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Decode(msg) => write!(f, "Undecodable response: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown backend error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if the same request could succeed when sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::ServerError(_) | ProviderError::Timeout(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::NotFound(_) => Some(404),
            ProviderError::Timeout(_) | ProviderError::Decode(_) | ProviderError::Unknown(_) => {
                None
            }
        }
    }
}

impl From<ProviderError> for DeckError {
    fn from(err: ProviderError) -> Self {
        DeckError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for ChatDeck operations.
#[derive(Error, Debug)]
pub enum DeckError {
    /// Settings could not be read, merged or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped backend failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Classified backend failure
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Unknown tool name, bad arguments or a handler failure
    #[error("Tool error: {0}")]
    Tool(String),

    /// Conversation log read/write failures
    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The task queue or event channel has no live peer
    #[error("Queue error: channel closed")]
    QueueClosed,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The model kept requesting tools past the iteration cap
    #[error("Tool loop exceeded {max} iterations")]
    ToolLoopExceeded { max: usize },

    /// Gave up waiting for a task to finish
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A task kind the worker has no handler for
    #[error("Unsupported task kind: {0}")]
    UnsupportedTask(String),
}

impl DeckError {
    /// Short, stable label for the error variant.
    ///
    /// Failed task events carry `"{kind_name}: {message}"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DeckError::Config(_) => "ConfigError",
            DeckError::Provider(_) | DeckError::ProviderTyped(_) => "ProviderError",
            DeckError::Tool(_) => "ToolError",
            DeckError::Conversation(_) => "ConversationError",
            DeckError::Io(_) => "IoError",
            DeckError::Json(_) => "JsonError",
            DeckError::Http(_) => "HttpError",
            DeckError::QueueClosed => "QueueClosed",
            DeckError::NotFound(_) => "NotFound",
            DeckError::ToolLoopExceeded { .. } => "ToolLoopExceeded",
            DeckError::Timeout(_) => "Timeout",
            DeckError::UnsupportedTask(_) => "UnsupportedTask",
        }
    }

    /// Render the error the way it is reported on the event channel.
    pub fn event_message(&self) -> String {
        format!("{}: {}", self.kind_name(), self)
    }
}

/// A specialized `Result` type for ChatDeck operations.
pub type Result<T> = std::result::Result<T, DeckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeckError::Config("settings file is not an object".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: settings file is not an object"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DeckError = io_err.into();
        assert!(matches!(err, DeckError::Io(_)));
        assert_eq!(err.kind_name(), "IoError");
    }

    #[test]
    fn test_tool_loop_event_message() {
        let err = DeckError::ToolLoopExceeded { max: 4 };
        assert_eq!(
            err.event_message(),
            "ToolLoopExceeded: Tool loop exceeded 4 iterations"
        );
    }

    #[test]
    fn test_provider_error_into_deck_error() {
        let err: DeckError = ProviderError::RateLimit("slow down".into()).into();
        assert!(matches!(err, DeckError::ProviderTyped(_)));
        assert_eq!(err.to_string(), "Provider error: Rate limit error: slow down");
        assert_eq!(err.kind_name(), "ProviderError");
    }

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::ServerError("x".into()).is_retryable());
        assert!(ProviderError::Timeout("x".into()).is_retryable());
        assert!(!ProviderError::Auth("x".into()).is_retryable());
        assert!(!ProviderError::Decode("x".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_status_code() {
        assert_eq!(ProviderError::NotFound("m".into()).status_code(), Some(404));
        assert_eq!(ProviderError::Decode("m".into()).status_code(), None);
    }
}
