//! Viewport anchoring and jump-to-message highlighting.

use std::time::Duration;

use tokio::time::Instant;

use crate::entities::Message;
use crate::types::MessageId;

/// Instruction for the view rendering the message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Jump to the newest message without animation.
    JumpToBottom,
    /// Animate to the newest message.
    SmoothToBottom,
    /// Bring a specific message into view.
    IntoView { message_id: MessageId, center: bool },
}

#[derive(Debug, Clone)]
struct Highlight {
    message_id: MessageId,
    until: Instant,
}

/// Keeps the view anchored to the newest message.
#[derive(Debug, Clone)]
pub struct ScrollController {
    rendered: usize,
    populated: bool,
    highlight: Option<Highlight>,
    highlight_for: Duration,
}

impl ScrollController {
    pub fn new(highlight_for: Duration) -> Self {
        Self {
            rendered: 0,
            populated: false,
            highlight: None,
            highlight_for,
        }
    }

    pub fn from_millis(highlight_millis: u64) -> Self {
        Self::new(Duration::from_millis(highlight_millis))
    }

    /// React to a change of the message list.
    ///
    /// The first non-empty list after loading jumps; later growth animates.
    pub fn on_feed_changed(&mut self, len: usize, loading: bool) -> Option<ScrollCommand> {
        if loading || len == 0 {
            return None;
        }

        let previous = std::mem::replace(&mut self.rendered, len);
        if !self.populated {
            self.populated = true;
            return Some(ScrollCommand::JumpToBottom);
        }

        (len > previous).then_some(ScrollCommand::SmoothToBottom)
    }

    /// Scroll a search result into view and highlight it.
    pub fn focus_message(&mut self, message_id: impl Into<MessageId>, now: Instant) -> ScrollCommand {
        let message_id = message_id.into();
        self.highlight = Some(Highlight {
            message_id: message_id.clone(),
            until: now + self.highlight_for,
        });
        ScrollCommand::IntoView {
            message_id,
            center: true,
        }
    }

    /// Message currently highlighted, if the highlight has not expired.
    pub fn highlighted(&self, now: Instant) -> Option<&str> {
        self.highlight
            .as_ref()
            .filter(|highlight| now < highlight.until)
            .map(|highlight| highlight.message_id.as_str())
    }

    /// Drop an expired highlight. Returns true when one was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.highlight {
            Some(highlight) if now >= highlight.until => {
                self.highlight = None;
                true
            }
            _ => false,
        }
    }

    /// Forget everything, for when another conversation is opened.
    pub fn reset(&mut self) {
        self.rendered = 0;
        self.populated = false;
        self.highlight = None;
    }
}

/// Whether a message starts a new group of messages from one sender.
pub fn shows_avatar(previous: Option<&Message>, current: &Message) -> bool {
    previous.map_or(true, |previous| previous.sender_id != current.sender_id)
}

/// Up to two initials of a display name.
pub fn initials(display_name: &str) -> String {
    let parts: Vec<&str> = display_name.split_whitespace().collect();
    let first_char = |part: &str| part.chars().next().into_iter().flat_map(char::to_uppercase);

    match parts.as_slice() {
        [] => String::new(),
        [only] => first_char(*only).collect(),
        [first, .., last] => first_char(*first).chain(first_char(*last)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NewMessage;
    use chrono::Utc;

    #[test]
    fn test_first_population_jumps_then_growth_animates() {
        let mut scroll = ScrollController::from_millis(1_200);

        assert_eq!(scroll.on_feed_changed(0, true), None);
        assert_eq!(scroll.on_feed_changed(3, true), None);
        assert_eq!(scroll.on_feed_changed(0, false), None);
        assert_eq!(scroll.on_feed_changed(3, false), Some(ScrollCommand::JumpToBottom));
        assert_eq!(scroll.on_feed_changed(3, false), None);
        assert_eq!(scroll.on_feed_changed(4, false), Some(ScrollCommand::SmoothToBottom));

        scroll.reset();
        assert_eq!(scroll.on_feed_changed(1, false), Some(ScrollCommand::JumpToBottom));
    }

    #[test]
    fn test_highlight_expires() {
        let mut scroll = ScrollController::from_millis(1_200);
        let start = Instant::now();

        let command = scroll.focus_message("m7", start);
        assert_eq!(
            command,
            ScrollCommand::IntoView {
                message_id: "m7".to_string(),
                center: true
            }
        );
        assert_eq!(scroll.highlighted(start + Duration::from_millis(1_199)), Some("m7"));
        assert!(!scroll.expire(start + Duration::from_millis(500)));

        let later = start + Duration::from_millis(1_200);
        assert_eq!(scroll.highlighted(later), None);
        assert!(scroll.expire(later));
        assert!(!scroll.expire(later));
    }

    #[test]
    fn test_shows_avatar_on_sender_change() {
        let a1 = NewMessage::text("c1", "a", "1").into_message("1", Utc::now());
        let a2 = NewMessage::text("c1", "a", "2").into_message("2", Utc::now());
        let b1 = NewMessage::text("c1", "b", "3").into_message("3", Utc::now());

        assert!(shows_avatar(None, &a1));
        assert!(!shows_avatar(Some(&a1), &a2));
        assert!(shows_avatar(Some(&a2), &b1));
    }

    #[test]
    fn test_initials() {
        assert_eq!(initials("ada lovelace"), "AL");
        assert_eq!(initials("  grace  "), "G");
        assert_eq!(initials("John Ronald Tolkien"), "JT");
        assert_eq!(initials(""), "");
    }
}
