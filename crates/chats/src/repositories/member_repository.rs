//! Port for conversation memberships.

use async_trait::async_trait;

use crate::entities::{Membership, MembershipStatus};
use crate::types::ChatResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn memberships(&self, conversation_id: &str) -> ChatResult<Vec<Membership>>;

    async fn update_status(
        &self,
        conversation_id: &str,
        user_id: &str,
        status: MembershipStatus,
    ) -> ChatResult<()>;
}
