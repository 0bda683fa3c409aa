//! Port for message rows.

use async_trait::async_trait;

use crate::entities::{Message, NewMessage};
use crate::types::ChatResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Full history of a conversation, ordered by creation time.
    async fn history(&self, conversation_id: &str) -> ChatResult<Vec<Message>>;

    /// Insert a message and return it as stored.
    async fn insert(&self, message: NewMessage) -> ChatResult<Message>;

    async fn delete_for_conversation(&self, conversation_id: &str) -> ChatResult<()>;
}
