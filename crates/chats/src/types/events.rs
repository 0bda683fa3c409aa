//! Event types for realtime feed updates.

use serde::{Deserialize, Serialize};

use crate::entities::Message;

/// A message newly appended to an open conversation feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedUpdate {
    pub message: Message,
    /// Whether a platform notification should be raised for it
    pub notify: bool,
}

impl FeedUpdate {
    pub fn conversation_id(&self) -> &str {
        &self.message.conversation_id
    }

    pub fn message_id(&self) -> &str {
        &self.message.id
    }
}
