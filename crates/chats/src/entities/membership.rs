use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{ChatError, ChatResult, ConversationId, UserId};

/// A user's membership in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Conversation this membership belongs to
    pub conversation_id: ConversationId,
    /// Member user
    pub user_id: UserId,
    /// Current request status
    pub status: MembershipStatus,
}

/// Membership status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Accepted,
    Blocked,
    Rejected,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Accepted => "accepted",
            MembershipStatus::Blocked => "blocked",
            MembershipStatus::Rejected => "rejected",
        }
    }

    /// Whether a member may move from this status to `next`.
    ///
    /// Accepting and rejecting answer a pending request; blocking is allowed
    /// from anything but an existing block.
    pub fn can_transition_to(&self, next: MembershipStatus) -> bool {
        match next {
            MembershipStatus::Accepted | MembershipStatus::Rejected => {
                matches!(self, MembershipStatus::Pending)
            }
            MembershipStatus::Blocked => !matches!(self, MembershipStatus::Blocked),
            MembershipStatus::Pending => false,
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipStatus {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MembershipStatus::Pending),
            "accepted" => Ok(MembershipStatus::Accepted),
            "blocked" => Ok(MembershipStatus::Blocked),
            "rejected" => Ok(MembershipStatus::Rejected),
            other => Err(ChatError::decode(format!("unknown membership status '{other}'"))),
        }
    }
}

impl Membership {
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
        status: MembershipStatus,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            status,
        }
    }

    /// A conversation is usable for messaging only once accepted.
    pub fn can_message(&self) -> bool {
        self.status == MembershipStatus::Accepted
    }

    /// Validate a status change before sending it to the backend.
    pub fn transition(&self, next: MembershipStatus) -> ChatResult<Membership> {
        if !self.status.can_transition_to(next) {
            return Err(ChatError::invalid_state(format!(
                "membership cannot move from {} to {}",
                self.status, next
            )));
        }

        Ok(Membership {
            status: next,
            ..self.clone()
        })
    }
}
