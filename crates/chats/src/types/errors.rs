//! Error types for the chat session core.

use thiserror::Error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Main error type for the chat session core
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Malformed record: {message}")]
    Decode { message: String },

    #[error("Action not available: {message}")]
    InvalidState { message: String },

    #[error("Microphone access denied: {message}")]
    CaptureDenied { message: String },

    #[error("Audio capture unavailable: {message}")]
    CaptureUnavailable { message: String },

    #[error("Already exists: {message}")]
    AlreadyExists { message: String },

    #[error("Realtime subscription closed")]
    SubscriptionClosed,

    #[error("Realtime feed missed {skipped} updates")]
    Lagged { skipped: u64 },
}

impl ChatError {
    /// Create a transport error (network request failed)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Create an object storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Create a not found error for conversations
    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        Self::ConversationNotFound { id: id.into() }
    }

    /// Create a not found error for messages
    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::MessageNotFound { id: id.into() }
    }

    /// Create an access denied error
    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied { reason: reason.into() }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a decode error for a malformed backend row
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }

    /// Create an invalid state error for a composer action
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create a capture permission error
    pub fn capture_denied(message: impl Into<String>) -> Self {
        Self::CaptureDenied { message: message.into() }
    }

    /// Create a capture availability error
    pub fn capture_unavailable(message: impl Into<String>) -> Self {
        Self::CaptureUnavailable { message: message.into() }
    }

    /// Create a duplicate error
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists { message: message.into() }
    }

    /// Create a gap error for a subscriber that fell behind the stream
    pub fn lagged(skipped: u64) -> Self {
        Self::Lagged { skipped }
    }
}

// Conversion from common error types
impl From<chrono::ParseError> for ChatError {
    fn from(err: chrono::ParseError) -> Self {
        Self::Decode {
            message: format!("Date parsing error: {}", err),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: format!("JSON error: {}", err),
        }
    }
}
