//! In-conversation message search.

use crate::entities::Message;
use crate::utils::Validator;

/// Text messages whose content contains `query`, ignoring case.
///
/// A blank query matches nothing. Results keep feed order.
pub fn search_messages<'a>(messages: &'a [Message], query: &str) -> Vec<&'a Message> {
    let Some(needle) = Validator::search_query(query) else {
        return Vec::new();
    };

    messages
        .iter()
        .filter(|message| {
            message
                .text()
                .map(|content| content.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .collect()
}
