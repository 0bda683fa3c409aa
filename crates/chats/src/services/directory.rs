//! Conversation list, chat requests and profile lookup.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::entities::{ConversationListing, MembershipStatus, Profile};
use crate::repositories::ConversationRepository;
use crate::types::{ChatError, ChatResult, ConversationId, UserId};

/// Maximum number of profiles returned by a search.
pub const PROFILE_SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ConversationDirectory {
    repository: Arc<dyn ConversationRepository>,
    user_id: UserId,
}

impl ConversationDirectory {
    pub fn new(repository: Arc<dyn ConversationRepository>, user_id: impl Into<UserId>) -> Self {
        Self {
            repository,
            user_id: user_id.into(),
        }
    }

    /// Conversations of the local user, skipping those whose other member
    /// has no profile.
    pub async fn list(&self) -> ChatResult<Vec<ConversationListing>> {
        let records = self.repository.list_for_user(&self.user_id).await?;

        let listings: Vec<ConversationListing> = records
            .into_iter()
            .filter_map(|record| {
                let status = record.membership_of(&self.user_id)?.status;
                let Some(other) = record
                    .other_member(&self.user_id)
                    .and_then(|member| member.profile.clone())
                else {
                    debug!(conversation_id = %record.conversation_id, "skipping conversation without profile");
                    return None;
                };

                Some(ConversationListing {
                    conversation_id: record.conversation_id.clone(),
                    other,
                    status,
                    incoming_request: status == MembershipStatus::Pending,
                    last_message: record.last_message.as_ref().map(|message| message.preview()),
                })
            })
            .collect();

        debug!(user_id = %self.user_id, count = listings.len(), "listed conversations");
        Ok(listings)
    }

    pub async fn search_profiles(&self, query: &str) -> ChatResult<Vec<Profile>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.repository
            .search_profiles(query, &self.user_id, PROFILE_SEARCH_LIMIT)
            .await
    }

    /// Profile with exactly this username.
    pub async fn find_by_username(&self, username: &str) -> ChatResult<Profile> {
        self.search_profiles(username)
            .await?
            .into_iter()
            .find(|profile| profile.username.eq_ignore_ascii_case(username.trim()))
            .ok_or_else(|| ChatError::validation(format!("No user named {}", username.trim())))
    }

    /// Ask `target_id` for a direct conversation.
    pub async fn request(&self, target_id: &str) -> ChatResult<ConversationId> {
        if target_id == self.user_id {
            return Err(ChatError::validation("Cannot start a conversation with yourself"));
        }

        if let Some(existing) = self
            .repository
            .existing_direct(&self.user_id, target_id)
            .await?
        {
            warn!(conversation_id = %existing, target_id, "conversation already exists");
            return Err(ChatError::already_exists(format!(
                "conversation {existing} already exists"
            )));
        }

        let conversation_id = self
            .repository
            .create_direct(&self.user_id, target_id)
            .await?;
        info!(conversation_id = %conversation_id, target_id, "conversation requested");
        Ok(conversation_id)
    }

    pub async fn delete(&self, conversation_id: &str) -> ChatResult<()> {
        self.repository.delete(conversation_id).await?;
        info!(conversation_id, "conversation deleted");
        Ok(())
    }
}
