use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{ChatError, ConversationId, MessageId, UserId};

/// A committed chat message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub created_at: DateTime<Utc>,
    pub body: MessageBody,
}

/// Payload of a message. Each kind carries exactly the fields it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageBody {
    Text { content: String },
    Audio { url: String },
    File(StoredFile),
}

/// Reference to a file held in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub url: String,
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
            MessageKind::File => "file",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "audio" => Ok(MessageKind::Audio),
            "file" => Ok(MessageKind::File),
            other => Err(ChatError::decode(format!("unknown message type '{other}'"))),
        }
    }
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::Audio { .. } => MessageKind::Audio,
            MessageBody::File(_) => MessageKind::File,
        }
    }
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Text content, for text messages only.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { content } => Some(content),
            _ => None,
        }
    }

    /// Storage URL of the attachment, if any.
    pub fn attachment_url(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { .. } => None,
            MessageBody::Audio { url } => Some(url),
            MessageBody::File(file) => Some(&file.url),
        }
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    /// Single-line summary used by conversation listings.
    pub fn preview(&self) -> String {
        match &self.body {
            MessageBody::Text { content } => content.lines().next().unwrap_or_default().to_string(),
            MessageBody::Audio { .. } => "Voice message".to_string(),
            MessageBody::File(file) => format!("File: {}", file.name),
        }
    }
}

/// A message about to be inserted. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: MessageBody,
}

impl NewMessage {
    pub fn text(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            body: MessageBody::Text {
                content: content.into(),
            },
        }
    }

    pub fn audio(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            body: MessageBody::Audio { url: url.into() },
        }
    }

    pub fn file(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        file: StoredFile,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            body: MessageBody::File(file),
        }
    }

    /// Row shape accepted by the `messages` table.
    pub fn to_row(&self) -> Value {
        let mut row = json!({
            "chat_id": self.conversation_id,
            "sender_id": self.sender_id,
            "type": self.body.kind().as_str(),
            "content": "",
        });

        match &self.body {
            MessageBody::Text { content } => {
                row["content"] = json!(content);
            }
            MessageBody::Audio { url } => {
                row["audio_url"] = json!(url);
            }
            MessageBody::File(file) => {
                row["file_url"] = json!(file.url);
                row["file_name"] = json!(file.name);
                row["file_type"] = json!(file.content_type);
                row["file_size"] = json!(file.size_bytes);
            }
        }

        row
    }

    /// Materialise the committed message once the store has assigned identity.
    pub fn into_message(self, id: impl Into<MessageId>, created_at: DateTime<Utc>) -> Message {
        Message {
            id: id.into(),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            created_at,
            body: self.body,
        }
    }
}
