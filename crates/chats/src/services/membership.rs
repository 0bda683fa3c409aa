//! Membership checks and request answers.

use std::sync::Arc;

use tracing::info;

use crate::entities::{Membership, MembershipStatus};
use crate::repositories::MembershipRepository;
use crate::types::{ChatError, ChatResult};

#[derive(Clone)]
pub struct MembershipService {
    repository: Arc<dyn MembershipRepository>,
}

impl MembershipService {
    pub fn new(repository: Arc<dyn MembershipRepository>) -> Self {
        Self { repository }
    }

    pub async fn memberships(&self, conversation_id: &str) -> ChatResult<Vec<Membership>> {
        self.repository.memberships(conversation_id).await
    }

    pub async fn membership_of(&self, conversation_id: &str, user_id: &str) -> ChatResult<Membership> {
        self.memberships(conversation_id)
            .await?
            .into_iter()
            .find(|membership| membership.user_id == user_id)
            .ok_or_else(|| ChatError::access_denied("not a member of this conversation"))
    }

    /// The other member of a direct conversation.
    pub async fn other_member(&self, conversation_id: &str, user_id: &str) -> ChatResult<Membership> {
        self.memberships(conversation_id)
            .await?
            .into_iter()
            .find(|membership| membership.user_id != user_id)
            .ok_or_else(|| ChatError::conversation_not_found(conversation_id))
    }

    /// Fail unless `user_id` may message in the conversation.
    pub async fn ensure_accepted(&self, conversation_id: &str, user_id: &str) -> ChatResult<Membership> {
        let membership = self.membership_of(conversation_id, user_id).await?;
        if !membership.can_message() {
            return Err(ChatError::access_denied(format!(
                "conversation request is {}",
                membership.status
            )));
        }
        Ok(membership)
    }

    pub async fn accept(&self, conversation_id: &str, user_id: &str) -> ChatResult<Membership> {
        let membership = self.membership_of(conversation_id, user_id).await?;
        self.apply(&membership, MembershipStatus::Accepted).await
    }

    pub async fn reject(&self, conversation_id: &str, user_id: &str) -> ChatResult<Membership> {
        let membership = self.membership_of(conversation_id, user_id).await?;
        self.apply(&membership, MembershipStatus::Rejected).await
    }

    /// Block the other member of the conversation.
    pub async fn block_other(&self, conversation_id: &str, user_id: &str) -> ChatResult<Membership> {
        // Only members may block.
        self.membership_of(conversation_id, user_id).await?;
        let other = self.other_member(conversation_id, user_id).await?;
        self.apply(&other, MembershipStatus::Blocked).await
    }

    async fn apply(&self, membership: &Membership, status: MembershipStatus) -> ChatResult<Membership> {
        let updated = membership.transition(status)?;
        self.repository
            .update_status(&updated.conversation_id, &updated.user_id, status)
            .await?;
        info!(
            conversation_id = %updated.conversation_id,
            user_id = %updated.user_id,
            status = %status,
            "membership updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryBackend;

    async fn service() -> (Arc<InMemoryBackend>, MembershipService) {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .add_conversation(
                "c1",
                &[("alice", MembershipStatus::Accepted), ("bob", MembershipStatus::Pending)],
            )
            .await;
        (backend.clone(), MembershipService::new(backend))
    }

    #[tokio::test]
    async fn test_ensure_accepted_gates_messaging() {
        let (_, service) = service().await;
        assert!(service.ensure_accepted("c1", "alice").await.is_ok());
        assert!(matches!(
            service.ensure_accepted("c1", "bob").await,
            Err(ChatError::AccessDenied { .. })
        ));
        assert!(matches!(
            service.ensure_accepted("c1", "mallory").await,
            Err(ChatError::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_accept_pending_request() {
        let (backend, service) = service().await;
        let updated = service.accept("c1", "bob").await.unwrap();
        assert_eq!(updated.status, MembershipStatus::Accepted);
        assert_eq!(
            backend.membership("c1", "bob").await.unwrap().status,
            MembershipStatus::Accepted
        );

        assert!(matches!(
            service.reject("c1", "bob").await,
            Err(ChatError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_block_targets_other_member() {
        let (backend, service) = service().await;
        service.block_other("c1", "alice").await.unwrap();

        assert_eq!(
            backend.membership("c1", "bob").await.unwrap().status,
            MembershipStatus::Blocked
        );
        assert_eq!(
            backend.membership("c1", "alice").await.unwrap().status,
            MembershipStatus::Accepted
        );
        assert!(service.block_other("c1", "alice").await.is_err());
    }
}
