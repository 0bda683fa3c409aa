use serde::{Deserialize, Serialize};

use super::membership::{Membership, MembershipStatus};
use super::message::Message;
use crate::types::{ConversationId, UserId};

/// Public profile of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Name shown in the UI, falling back to the username.
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}

/// A member of a conversation together with their profile, if it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub membership: Membership,
    pub profile: Option<Profile>,
}

/// Conversation as returned by the backend for one of its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: ConversationId,
    pub members: Vec<MemberProfile>,
    pub last_message: Option<Message>,
}

impl ConversationRecord {
    pub fn membership_of(&self, user_id: &str) -> Option<&Membership> {
        self.members
            .iter()
            .map(|member| &member.membership)
            .find(|membership| membership.user_id == user_id)
    }

    /// The member that is not `user_id`, for direct conversations.
    pub fn other_member(&self, user_id: &str) -> Option<&MemberProfile> {
        self.members
            .iter()
            .find(|member| member.membership.user_id != user_id)
    }
}

/// Entry of the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationListing {
    pub conversation_id: ConversationId,
    pub other: Profile,
    /// Status of the local user's membership
    pub status: MembershipStatus,
    /// The other member asked to chat and the local user has not answered
    pub incoming_request: bool,
    pub last_message: Option<String>,
}
