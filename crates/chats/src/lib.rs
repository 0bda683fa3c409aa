//! # Chatify Chats Crate
//!
//! Session core of the Chatify messaging client: everything that happens
//! while a single conversation is open, written against backend ports so it
//! can run over the hosted platform or entirely in memory.
//!
//! ## Architecture
//!
//! - **Entities**: Messages, memberships, attachments, reactions, profiles
//! - **Repositories**: Backend ports plus an in-memory backend
//! - **Services**: Composer, upload pipeline, realtime feed, scroll state
//! - **Types**: Errors, progress reporting, feed events
//! - **Utils**: Validating decode of backend rows and input validation
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use chatify_chats::{
//!     BackendHandle, ChatSession, InMemoryBackend, MembershipStatus, ScriptedCaptureDevice,
//!     TracingNotifier,
//! };
//! use chatify_config::ClientConfig;
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let backend = Arc::new(InMemoryBackend::new());
//! backend
//!     .add_conversation("c1", &[("me", MembershipStatus::Accepted), ("you", MembershipStatus::Accepted)])
//!     .await;
//!
//! let mut session = ChatSession::open(
//!     &BackendHandle::from_backend(backend),
//!     &ClientConfig::default(),
//!     "c1",
//!     "me",
//!     Arc::new(ScriptedCaptureDevice::new(vec![0u8; 16])),
//!     Arc::new(TracingNotifier),
//! )
//! .await
//! .unwrap();
//!
//! session.composer_mut().set_draft("hello");
//! session.send_text().await.unwrap();
//! assert_eq!(session.messages().len(), 1);
//! # }
//! ```

pub mod entities;
pub mod repositories;
pub mod services;
pub mod types;
pub mod utils;

pub use entities::{
    AttachmentCategory, AudioClip, FileSelection, Membership, MembershipStatus, Message,
    MessageBody, MessageKind, NewMessage, PendingAttachment, Profile, Reaction, ReactionSummary,
    StoredFile,
};
pub use repositories::{
    BackendHandle, ConversationRepository, InMemoryBackend, MembershipRepository,
    MessageRepository, ObjectStorage, ReactionRepository, RealtimeSource, Subscription,
};
pub use services::{
    ChatSession, Composer, ComposerMode, ComposerState, ConversationDirectory, ConversationFeed,
    NoticeBoard, Notifier, ScriptedCaptureDevice, ScrollCommand, ScrollController, SessionEvent,
    TracingNotifier, UploadPipeline,
};
pub use types::{ChatError, ChatResult, FeedUpdate, ProgressReporter};
