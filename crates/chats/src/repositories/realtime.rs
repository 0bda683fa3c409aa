//! Port for realtime insert notifications.

use std::fmt;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};

use crate::entities::Message;
use crate::types::ChatResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeSource: Send + Sync {
    /// Start a live stream of inserts scoped to one conversation.
    async fn subscribe(&self, conversation_id: &str) -> ChatResult<Subscription>;
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Live stream of inserted messages for one conversation.
///
/// Items are `Err` when a pushed row fails validation or the subscriber fell
/// behind and missed inserts. Once [`Subscription::unsubscribe`] is called, or
/// the subscription is dropped, the teardown runs and no further items are
/// yielded. A stream that stops on its own is reported by [`Subscription::is_ended`].
pub struct Subscription {
    events: BoxStream<'static, ChatResult<Message>>,
    teardown: Option<Teardown>,
    closed: bool,
    ended: bool,
}

impl Subscription {
    pub fn new(
        events: BoxStream<'static, ChatResult<Message>>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            teardown: Some(Box::new(teardown)),
            closed: false,
            ended: false,
        }
    }

    pub fn from_stream(events: BoxStream<'static, ChatResult<Message>>) -> Self {
        Self {
            events,
            teardown: None,
            closed: false,
            ended: false,
        }
    }

    /// Wait for the next insert. `None` once the stream ended or was closed.
    pub async fn next(&mut self) -> Option<ChatResult<Message>> {
        if self.closed || self.ended {
            return None;
        }
        let item = self.events.next().await;
        self.ended = item.is_none();
        item
    }

    /// Take an insert that is already available without waiting.
    pub fn try_next(&mut self) -> Option<ChatResult<Message>> {
        if self.closed || self.ended {
            return None;
        }
        match self.events.next().now_or_never() {
            Some(None) => {
                self.ended = true;
                None
            }
            Some(item) => item,
            None => None,
        }
    }

    pub fn unsubscribe(&mut self) {
        self.closed = true;
        self.events = stream::empty().boxed();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the stream stopped without [`Subscription::unsubscribe`].
    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.closed)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}
