//! Backend boundary for the chat session core.
//!
//! Each repository trait is one port onto the hosted backend platform. The
//! session services only ever see these traits, bundled together in a
//! [`BackendHandle`] that is built once at process start and passed in
//! explicitly. [`InMemoryBackend`] implements every port for tests and
//! offline use.

use std::sync::Arc;

pub mod conversation_repository;
pub mod member_repository;
pub mod memory;
pub mod message_repository;
pub mod reaction_repository;
pub mod realtime;
pub mod storage;

// Re-export all ports
pub use conversation_repository::ConversationRepository;
pub use member_repository::MembershipRepository;
pub use memory::InMemoryBackend;
pub use message_repository::MessageRepository;
pub use reaction_repository::ReactionRepository;
pub use realtime::{RealtimeSource, Subscription};
pub use storage::ObjectStorage;

/// Process-wide connection to the backend platform.
///
/// Cloning is cheap; every clone talks to the same ports.
#[derive(Clone)]
pub struct BackendHandle {
    pub messages: Arc<dyn MessageRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub realtime: Arc<dyn RealtimeSource>,
    pub memberships: Arc<dyn MembershipRepository>,
    pub reactions: Arc<dyn ReactionRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
}

impl BackendHandle {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        storage: Arc<dyn ObjectStorage>,
        realtime: Arc<dyn RealtimeSource>,
        memberships: Arc<dyn MembershipRepository>,
        reactions: Arc<dyn ReactionRepository>,
        conversations: Arc<dyn ConversationRepository>,
    ) -> Self {
        Self {
            messages,
            storage,
            realtime,
            memberships,
            reactions,
            conversations,
        }
    }

    /// Build a handle from one value that implements every port.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: MessageRepository
            + ObjectStorage
            + RealtimeSource
            + MembershipRepository
            + ReactionRepository
            + ConversationRepository
            + 'static,
    {
        Self {
            messages: backend.clone(),
            storage: backend.clone(),
            realtime: backend.clone(),
            memberships: backend.clone(),
            reactions: backend.clone(),
            conversations: backend,
        }
    }

    pub fn with_messages(mut self, messages: Arc<dyn MessageRepository>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_realtime(mut self, realtime: Arc<dyn RealtimeSource>) -> Self {
        self.realtime = realtime;
        self
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle").finish_non_exhaustive()
    }
}
