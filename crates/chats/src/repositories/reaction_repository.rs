//! Port for message reactions.

use async_trait::async_trait;

use crate::entities::{NewReaction, Reaction};
use crate::types::{ChatResult, MessageId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReactionRepository: Send + Sync {
    async fn for_messages(&self, message_ids: &[MessageId]) -> ChatResult<Vec<Reaction>>;

    async fn insert(&self, reaction: NewReaction) -> ChatResult<Reaction>;

    /// Remove every reaction of `user_id` with `emoji` on the message.
    async fn delete(&self, message_id: &str, user_id: &str, emoji: &str) -> ChatResult<()>;
}
