//! Port for conversations and the profiles shown alongside them.

use async_trait::async_trait;

use crate::entities::{ConversationRecord, Profile};
use crate::types::{ChatResult, ConversationId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Conversations `user_id` is a member of, most recent first.
    async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<ConversationRecord>>;

    /// Direct conversation shared by the two users, if one exists.
    async fn existing_direct(&self, user_a: &str, user_b: &str) -> ChatResult<Option<ConversationId>>;

    /// Create a direct conversation. The requester is accepted and the
    /// target is left pending.
    async fn create_direct(&self, requester_id: &str, target_id: &str) -> ChatResult<ConversationId>;

    /// Delete memberships, messages and the conversation itself.
    async fn delete(&self, conversation_id: &str) -> ChatResult<()>;

    /// Profiles whose username or display name contains `query`.
    async fn search_profiles(
        &self,
        query: &str,
        exclude_user_id: &str,
        limit: usize,
    ) -> ChatResult<Vec<Profile>>;
}
