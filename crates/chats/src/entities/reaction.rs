use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{MessageId, ReactionId, UserId};

/// Emoji offered by the reaction picker, in display order.
pub const REACTION_PALETTE: [&str; 9] = ["👍", "❤️", "😂", "😮", "😢", "👏", "🎉", "🔥", "🙏"];

/// A user's emoji reaction to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: ReactionId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Reaction about to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReaction {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
}

impl NewReaction {
    pub fn new(
        message_id: impl Into<MessageId>,
        user_id: impl Into<UserId>,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            user_id: user_id.into(),
            emoji: emoji.into(),
        }
    }

    pub fn to_row(&self) -> Value {
        json!({
            "message_id": self.message_id,
            "user_id": self.user_id,
            "emoji": self.emoji,
        })
    }
}

/// Aggregated reactions of one emoji on one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    /// Whether the local user is among the reactors
    pub mine: bool,
}

pub fn is_palette_emoji(emoji: &str) -> bool {
    REACTION_PALETTE.contains(&emoji)
}
