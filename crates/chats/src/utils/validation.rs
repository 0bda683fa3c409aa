//! Validation utilities.

use crate::entities::is_palette_emoji;
use crate::types::{ChatError, ChatResult};

/// Validation utilities
pub struct Validator;

impl Validator {
    /// Validate message content, returning the trimmed text to send
    pub fn message_content(content: &str, max_length: usize) -> ChatResult<String> {
        let trimmed = content.trim();

        if trimmed.is_empty() {
            return Err(ChatError::validation("Message content cannot be empty"));
        }

        if trimmed.chars().count() > max_length {
            return Err(ChatError::validation(format!(
                "Message content too long (max {} characters)",
                max_length
            )));
        }

        Ok(trimmed.to_string())
    }

    /// Validate file name
    pub fn file_name(file_name: &str) -> ChatResult<()> {
        if file_name.trim().is_empty() {
            return Err(ChatError::validation("File name cannot be empty"));
        }

        if file_name.len() > 255 {
            return Err(ChatError::validation("File name too long (max 255 characters)"));
        }

        let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
        for char in invalid_chars {
            if file_name.contains(char) {
                return Err(ChatError::validation(format!(
                    "File name contains invalid character: {}",
                    char
                )));
            }
        }

        Ok(())
    }

    /// Validate file size
    pub fn file_size(size_bytes: u64, max_size_bytes: u64) -> ChatResult<()> {
        if size_bytes == 0 {
            return Err(ChatError::validation("File is empty"));
        }

        if size_bytes > max_size_bytes {
            return Err(ChatError::validation(format!(
                "File size too large (max {} MB)",
                max_size_bytes / (1024 * 1024)
            )));
        }

        Ok(())
    }

    /// Validate MIME type
    pub fn content_type(content_type: &str) -> ChatResult<()> {
        let Some((kind, subtype)) = content_type.split_once('/') else {
            return Err(ChatError::validation(format!(
                "Invalid content type: {}",
                content_type
            )));
        };

        if kind.trim().is_empty() || subtype.trim().is_empty() {
            return Err(ChatError::validation(format!(
                "Invalid content type: {}",
                content_type
            )));
        }

        Ok(())
    }

    /// Validate a reaction emoji against the picker palette
    pub fn reaction_emoji(emoji: &str) -> ChatResult<()> {
        if !is_palette_emoji(emoji) {
            return Err(ChatError::validation(format!("Unsupported reaction: {}", emoji)));
        }

        Ok(())
    }

    /// Reduce an identifier to a single storage key segment.
    ///
    /// Anything outside ASCII alphanumerics, `-` and `_` becomes `-`, so the
    /// result never contains a path separator or a dot.
    pub fn key_segment(raw: &str) -> String {
        let segment: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        if segment.is_empty() {
            "-".to_string()
        } else {
            segment
        }
    }

    /// File extension usable in a storage key: lowercase ASCII alphanumerics
    /// of at most 16 characters, otherwise `None`.
    pub fn key_extension(raw: &str) -> Option<String> {
        let ext = raw.trim().to_ascii_lowercase();
        let valid = !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then_some(ext)
    }

    /// Normalise a search query; blank queries yield `None`
    pub fn search_query(query: &str) -> Option<String> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }
}
