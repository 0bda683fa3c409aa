//! Internal utilities for the chat session core.
//!
//! Validation of user input and validating decode of backend rows.

pub mod decode;
pub mod validation;

// Re-export utilities
pub use validation::*;
