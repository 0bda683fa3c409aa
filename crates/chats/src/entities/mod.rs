//! Domain entities for the chat session core.

pub mod attachment;
pub mod conversation;
pub mod membership;
pub mod message;
pub mod reaction;

// Re-export all entities
pub use attachment::*;
pub use conversation::*;
pub use membership::*;
pub use message::*;
pub use reaction::*;
