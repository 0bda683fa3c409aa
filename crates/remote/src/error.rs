use chatify_chats::ChatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },
    #[error("invalid response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("realtime join rejected: {0}")]
    JoinRejected(String),
    #[error("realtime join timed out")]
    JoinTimeout,
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Map onto the session error taxonomy for an object storage call.
    pub fn into_storage(self) -> ChatError {
        match self.status() {
            Some(401 | 403) => ChatError::access_denied(self.to_string()),
            Some(409) => ChatError::already_exists(self.to_string()),
            _ => ChatError::storage(self.to_string()),
        }
    }
}

impl From<RemoteError> for ChatError {
    fn from(error: RemoteError) -> Self {
        match error.status() {
            Some(401 | 403) => return ChatError::access_denied(error.to_string()),
            Some(409) => return ChatError::already_exists(error.to_string()),
            _ => {}
        }
        match error {
            RemoteError::Json(error) => ChatError::decode(error.to_string()),
            RemoteError::UnexpectedResponse(message) => ChatError::decode(message),
            RemoteError::JoinRejected(reason) => ChatError::access_denied(reason),
            other => ChatError::transport(other.to_string()),
        }
    }
}
