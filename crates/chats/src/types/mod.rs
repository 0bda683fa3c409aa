//! Shared types and interfaces for the chat session core.
//!
//! This module contains identifiers, error definitions, realtime event
//! payloads and upload progress reporting used across the crate.

pub mod errors;
pub mod events;
pub mod progress;

// Re-export common types
pub use errors::{ChatError, ChatResult};
pub use events::*;
pub use progress::ProgressReporter;

// Common type aliases
pub type ConversationId = String;
pub type MessageId = String;
pub type ReactionId = String;
pub type UserId = String;
