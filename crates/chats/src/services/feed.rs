//! Realtime message feed of one open conversation.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use chatify_config::FeedOrdering;
use tracing::{debug, info, warn};

use crate::entities::Message;
use crate::repositories::{BackendHandle, MessageRepository, Subscription};
use crate::types::{ChatError, ChatResult, ConversationId, FeedUpdate, MessageId, UserId};

/// Decides whether an incoming message deserves a platform notification.
///
/// Only messages from someone else, not seen just before, and arriving while
/// the conversation is not visible are announced.
#[derive(Debug, Clone)]
pub struct NotificationGate {
    local_user: UserId,
    last_seen: Option<MessageId>,
    visible: bool,
}

impl NotificationGate {
    pub fn new(local_user: impl Into<UserId>) -> Self {
        Self {
            local_user: local_user.into(),
            last_seen: None,
            visible: true,
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn should_notify(&mut self, message: &Message) -> bool {
        let repeated = self.last_seen.as_deref() == Some(message.id.as_str());
        self.last_seen = Some(message.id.clone());
        !message.is_from(&self.local_user) && !repeated && !self.visible
    }
}

/// Ordered, deduplicated message list kept in sync with the store.
pub struct ConversationFeed {
    conversation_id: ConversationId,
    ordering: FeedOrdering,
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    subscription: Option<Subscription>,
    pending: VecDeque<ChatResult<FeedUpdate>>,
    store: Arc<dyn MessageRepository>,
    gate: NotificationGate,
}

impl ConversationFeed {
    /// Open the feed: subscribe, then load history.
    ///
    /// This reverses the plain fetch-then-subscribe order on purpose. The
    /// subscription is established before the history request so that
    /// inserts landing in between are buffered rather than lost. Nothing is
    /// appended from the subscription until history is in place, and
    /// buffered inserts already present in history are skipped, so the
    /// result is still history first, then live events.
    pub async fn open(
        backend: &BackendHandle,
        conversation_id: impl Into<ConversationId>,
        local_user: impl Into<UserId>,
        ordering: FeedOrdering,
    ) -> ChatResult<Self> {
        let conversation_id = conversation_id.into();
        let subscription = backend.realtime.subscribe(&conversation_id).await?;
        let history = backend.messages.history(&conversation_id).await?;

        let mut feed = Self {
            conversation_id,
            ordering,
            messages: Vec::with_capacity(history.len()),
            seen: HashSet::with_capacity(history.len()),
            subscription: Some(subscription),
            pending: VecDeque::new(),
            store: backend.messages.clone(),
            gate: NotificationGate::new(local_user),
        };
        for message in history {
            feed.ingest(message);
        }

        info!(
            conversation_id = %feed.conversation_id,
            history = feed.messages.len(),
            ordering = ?ordering,
            "conversation feed opened"
        );
        Ok(feed)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.gate.set_visible(visible);
    }

    /// Wait for the next new message from the live stream.
    ///
    /// Duplicates are skipped silently. An `Err` item means a pushed row
    /// failed validation, the subscriber missed inserts (history is reloaded
    /// to recover them), or the stream stopped without [`Self::close`]. In
    /// the last case the item is [`ChatError::SubscriptionClosed`] and the
    /// feed is closed afterwards. `None` once closed.
    pub async fn next_update(&mut self) -> Option<ChatResult<FeedUpdate>> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }
            let item = self.subscription.as_mut()?.next().await;
            match item {
                Some(result) => self.receive(result).await,
                None => return Some(Err(self.ended())),
            }
        }
    }

    /// Apply every insert that is already available without waiting for
    /// new ones. A lag still awaits the history reload.
    pub async fn drain_ready(&mut self) -> Vec<ChatResult<FeedUpdate>> {
        loop {
            let item = match self.subscription.as_mut() {
                Some(subscription) => subscription.try_next(),
                None => break,
            };
            match item {
                Some(result) => self.receive(result).await,
                None => {
                    if self.subscription.as_ref().is_some_and(Subscription::is_ended) {
                        let error = self.ended();
                        self.pending.push_back(Err(error));
                    }
                    break;
                }
            }
        }
        self.pending.drain(..).collect()
    }

    /// Record a message this client committed itself.
    ///
    /// Returns false when the realtime echo already delivered it.
    pub fn record_sent(&mut self, message: Message) -> bool {
        if message.conversation_id != self.conversation_id {
            return false;
        }
        self.ingest(message)
    }

    /// Tear the subscription down. No further messages are appended.
    pub fn close(&mut self) {
        self.pending.clear();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            info!(conversation_id = %self.conversation_id, "conversation feed closed");
        }
    }

    async fn receive(&mut self, result: ChatResult<Message>) {
        match result {
            Ok(message) => {
                if let Some(update) = self.accept(message) {
                    self.pending.push_back(Ok(update));
                }
            }
            Err(error @ ChatError::Lagged { .. }) => {
                warn!(conversation_id = %self.conversation_id, %error, "reloading history after missed inserts");
                self.pending.push_back(Err(error));
                self.backfill().await;
            }
            Err(error) => {
                warn!(conversation_id = %self.conversation_id, ?error, "dropping malformed insert");
                self.pending.push_back(Err(error));
            }
        }
    }

    async fn backfill(&mut self) {
        match self.store.history(&self.conversation_id).await {
            Ok(history) => {
                let before = self.messages.len();
                for message in history {
                    if let Some(update) = self.accept(message) {
                        self.pending.push_back(Ok(update));
                    }
                }
                debug!(
                    conversation_id = %self.conversation_id,
                    recovered = self.messages.len() - before,
                    "history reloaded"
                );
            }
            Err(error) => {
                warn!(conversation_id = %self.conversation_id, ?error, "history reload failed");
                self.pending.push_back(Err(error));
            }
        }
    }

    fn ended(&mut self) -> ChatError {
        warn!(conversation_id = %self.conversation_id, "realtime stream ended");
        self.subscription = None;
        ChatError::SubscriptionClosed
    }

    fn accept(&mut self, message: Message) -> Option<FeedUpdate> {
        if message.conversation_id != self.conversation_id {
            debug!(
                conversation_id = %self.conversation_id,
                other = %message.conversation_id,
                "ignoring insert for another conversation"
            );
            return None;
        }
        if !self.ingest(message.clone()) {
            return None;
        }
        let notify = self.gate.should_notify(&message);
        Some(FeedUpdate { message, notify })
    }

    fn ingest(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }

        match self.ordering {
            FeedOrdering::Arrival => self.messages.push(message),
            FeedOrdering::CreatedAt => {
                let index = self
                    .messages
                    .partition_point(|existing| existing.created_at <= message.created_at);
                self.messages.insert(index, message);
            }
        }
        true
    }
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ConversationFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationFeed")
            .field("conversation_id", &self.conversation_id)
            .field("ordering", &self.ordering)
            .field("messages", &self.messages.len())
            .field("subscription", &self.subscription)
            .field("pending", &self.pending.len())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
