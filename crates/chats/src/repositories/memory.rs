//! In-memory implementation of every backend port.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use super::{
    ConversationRepository, MembershipRepository, MessageRepository, ObjectStorage,
    ReactionRepository, RealtimeSource, Subscription,
};
use crate::entities::{
    ConversationRecord, MemberProfile, Membership, MembershipStatus, Message, MessageBody,
    NewMessage, NewReaction, Profile, Reaction,
};
use crate::types::{ChatError, ChatResult, ConversationId, MessageId, ProgressReporter};

const DEFAULT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
}

#[derive(Debug, Default)]
struct Failures {
    upload_types: HashSet<String>,
    insert_needles: Vec<String>,
    deletes: bool,
}

#[derive(Default)]
struct State {
    conversations: Vec<ConversationId>,
    memberships: Vec<Membership>,
    profiles: HashMap<String, Profile>,
    messages: Vec<Message>,
    reactions: Vec<Reaction>,
    objects: HashMap<(String, String), StoredObject>,
    channels: HashMap<ConversationId, broadcast::Sender<Message>>,
    failures: Failures,
    last_created_at: Option<DateTime<Utc>>,
    next_id: u64,
    uploads: usize,
    deletes: usize,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Strictly increasing creation timestamps.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }

    fn has_conversation(&self, conversation_id: &str) -> bool {
        self.conversations.iter().any(|id| id == conversation_id)
    }
}

/// Backend held entirely in memory.
///
/// Inserts are broadcast to realtime subscribers of the conversation, objects
/// get `memory://{bucket}/{key}` URLs. Failures can be injected per content
/// type, per message payload, or for deletes.
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
    channel_capacity: usize,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Backend whose realtime channels buffer up to `channel_capacity` inserts.
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub async fn add_profile(&self, profile: Profile) {
        let mut state = self.state.write().await;
        state.profiles.insert(profile.id.clone(), profile);
    }

    /// Register a conversation with the given members.
    pub async fn add_conversation(
        &self,
        conversation_id: impl Into<ConversationId>,
        members: &[(&str, MembershipStatus)],
    ) {
        let conversation_id = conversation_id.into();
        let mut state = self.state.write().await;
        if !state.has_conversation(&conversation_id) {
            state.conversations.push(conversation_id.clone());
        }
        for (user_id, status) in members {
            state
                .memberships
                .push(Membership::new(conversation_id.clone(), *user_id, *status));
        }
    }

    pub async fn messages_in(&self, conversation_id: &str) -> Vec<Message> {
        let state = self.state.read().await;
        state
            .messages
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub async fn membership(&self, conversation_id: &str, user_id: &str) -> Option<Membership> {
        let state = self.state.read().await;
        state
            .memberships
            .iter()
            .find(|m| m.conversation_id == conversation_id && m.user_id == user_id)
            .cloned()
    }

    pub async fn has_object(&self, bucket: &str, key: &str) -> bool {
        let state = self.state.read().await;
        state
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub async fn object_content_type(&self, bucket: &str, key: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.content_type.clone())
    }

    pub async fn object_count(&self) -> usize {
        self.state.read().await.objects.len()
    }

    /// Number of upload calls, successful or not.
    pub async fn upload_count(&self) -> usize {
        self.state.read().await.uploads
    }

    /// Number of delete calls, successful or not.
    pub async fn delete_count(&self) -> usize {
        self.state.read().await.deletes
    }

    pub async fn subscriber_count(&self, conversation_id: &str) -> usize {
        let state = self.state.read().await;
        state
            .channels
            .get(conversation_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Make uploads with this content type fail.
    pub async fn fail_uploads_of_type(&self, content_type: &str) {
        let mut state = self.state.write().await;
        state.failures.upload_types.insert(content_type.to_string());
    }

    /// Make inserts fail when the text, file name or audio URL contains `needle`.
    pub async fn fail_inserts_matching(&self, needle: &str) {
        let mut state = self.state.write().await;
        state.failures.insert_needles.push(needle.to_string());
    }

    pub async fn fail_deletes(&self, fail: bool) {
        self.state.write().await.failures.deletes = fail;
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failures = Failures::default();
    }

    fn insert_fails(failures: &Failures, message: &NewMessage) -> bool {
        let haystack = match &message.body {
            MessageBody::Text { content } => content.as_str(),
            MessageBody::Audio { url } => url.as_str(),
            MessageBody::File(file) => file.name.as_str(),
        };
        failures
            .insert_needles
            .iter()
            .any(|needle| haystack.contains(needle.as_str()))
    }
}

#[async_trait]
impl MessageRepository for InMemoryBackend {
    async fn history(&self, conversation_id: &str) -> ChatResult<Vec<Message>> {
        let state = self.state.read().await;
        if !state.has_conversation(conversation_id) {
            return Err(ChatError::conversation_not_found(conversation_id));
        }

        let mut history: Vec<Message> = state
            .messages
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect();
        history.sort_by_key(|message| message.created_at);
        Ok(history)
    }

    async fn insert(&self, message: NewMessage) -> ChatResult<Message> {
        let mut state = self.state.write().await;
        if !state.has_conversation(&message.conversation_id) {
            return Err(ChatError::conversation_not_found(&message.conversation_id));
        }
        if Self::insert_fails(&state.failures, &message) {
            return Err(ChatError::transport("insert rejected by backend"));
        }

        let id = state.next_id("msg");
        let created_at = state.next_timestamp();
        let message = message.into_message(id, created_at);
        state.messages.push(message.clone());

        if let Some(sender) = state.channels.get(&message.conversation_id) {
            // No receivers is fine.
            let _ = sender.send(message.clone());
        }

        debug!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "stored message"
        );
        Ok(message)
    }

    async fn delete_for_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        let mut state = self.state.write().await;
        let removed: HashSet<MessageId> = state
            .messages
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .map(|message| message.id.clone())
            .collect();
        state
            .messages
            .retain(|message| message.conversation_id != conversation_id);
        state
            .reactions
            .retain(|reaction| !removed.contains(&reaction.message_id));
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        progress: &ProgressReporter,
    ) -> ChatResult<String> {
        let mut state = self.state.write().await;
        state.uploads += 1;

        if state.failures.upload_types.contains(content_type) {
            return Err(ChatError::storage(format!(
                "upload of {content_type} rejected by storage"
            )));
        }

        let object_key = (bucket.to_string(), key.to_string());
        if state.objects.contains_key(&object_key) {
            return Err(ChatError::already_exists(format!("object {bucket}/{key}")));
        }

        progress.advance(50);
        state.objects.insert(
            object_key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        progress.complete();

        Ok(format!("memory://{bucket}/{key}"))
    }

    async fn delete(&self, bucket: &str, key: &str) -> ChatResult<()> {
        let mut state = self.state.write().await;
        state.deletes += 1;

        if state.failures.deletes {
            return Err(ChatError::storage(format!("delete of {bucket}/{key} failed")));
        }

        let removed = state.objects.remove(&(bucket.to_string(), key.to_string()));
        if let Some(object) = removed {
            debug!(bucket, key, size = object.bytes.len(), "deleted object");
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeSource for InMemoryBackend {
    async fn subscribe(&self, conversation_id: &str) -> ChatResult<Subscription> {
        let mut state = self.state.write().await;
        let capacity = self.channel_capacity;
        let receiver = state
            .channels
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        let events = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(message) => Some((Ok(message), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "realtime subscriber lagged behind");
                    Some((Err(ChatError::lagged(skipped)), receiver))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        })
        .boxed();

        let conversation = conversation_id.to_string();
        Ok(Subscription::new(events, move || {
            debug!(conversation_id = %conversation, "realtime subscription closed");
        }))
    }
}

#[async_trait]
impl MembershipRepository for InMemoryBackend {
    async fn memberships(&self, conversation_id: &str) -> ChatResult<Vec<Membership>> {
        let state = self.state.read().await;
        if !state.has_conversation(conversation_id) {
            return Err(ChatError::conversation_not_found(conversation_id));
        }
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        conversation_id: &str,
        user_id: &str,
        status: MembershipStatus,
    ) -> ChatResult<()> {
        let mut state = self.state.write().await;
        let membership = state
            .memberships
            .iter_mut()
            .find(|m| m.conversation_id == conversation_id && m.user_id == user_id)
            .ok_or_else(|| ChatError::conversation_not_found(conversation_id))?;
        membership.status = status;
        Ok(())
    }
}

#[async_trait]
impl ReactionRepository for InMemoryBackend {
    async fn for_messages(&self, message_ids: &[MessageId]) -> ChatResult<Vec<Reaction>> {
        let state = self.state.read().await;
        Ok(state
            .reactions
            .iter()
            .filter(|reaction| message_ids.contains(&reaction.message_id))
            .cloned()
            .collect())
    }

    async fn insert(&self, reaction: NewReaction) -> ChatResult<Reaction> {
        let mut state = self.state.write().await;
        if !state.messages.iter().any(|m| m.id == reaction.message_id) {
            return Err(ChatError::message_not_found(&reaction.message_id));
        }

        let id = state.next_id("reaction");
        let created_at = state.next_timestamp();
        let stored = Reaction {
            id,
            message_id: reaction.message_id,
            user_id: reaction.user_id,
            emoji: reaction.emoji,
            created_at: Some(created_at),
        };
        state.reactions.push(stored.clone());
        Ok(stored)
    }

    async fn delete(&self, message_id: &str, user_id: &str, emoji: &str) -> ChatResult<()> {
        let mut state = self.state.write().await;
        state.reactions.retain(|reaction| {
            !(reaction.message_id == message_id && reaction.user_id == user_id && reaction.emoji == emoji)
        });
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for InMemoryBackend {
    async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<ConversationRecord>> {
        let state = self.state.read().await;

        let records = state
            .conversations
            .iter()
            .rev()
            .filter(|conversation_id| {
                state
                    .memberships
                    .iter()
                    .any(|m| &m.conversation_id == *conversation_id && m.user_id == user_id)
            })
            .map(|conversation_id| {
                let members = state
                    .memberships
                    .iter()
                    .filter(|m| &m.conversation_id == conversation_id)
                    .map(|membership| MemberProfile {
                        membership: membership.clone(),
                        profile: state.profiles.get(&membership.user_id).cloned(),
                    })
                    .collect();
                let last_message = state
                    .messages
                    .iter()
                    .filter(|m| &m.conversation_id == conversation_id)
                    .max_by_key(|m| m.created_at)
                    .cloned();

                ConversationRecord {
                    conversation_id: conversation_id.clone(),
                    members,
                    last_message,
                }
            })
            .collect();

        Ok(records)
    }

    async fn existing_direct(&self, user_a: &str, user_b: &str) -> ChatResult<Option<ConversationId>> {
        let state = self.state.read().await;
        let is_member = |conversation_id: &str, user_id: &str| {
            state
                .memberships
                .iter()
                .any(|m| m.conversation_id == conversation_id && m.user_id == user_id)
        };

        Ok(state
            .conversations
            .iter()
            .find(|id| is_member(id.as_str(), user_a) && is_member(id.as_str(), user_b))
            .cloned())
    }

    async fn create_direct(&self, requester_id: &str, target_id: &str) -> ChatResult<ConversationId> {
        let mut state = self.state.write().await;
        let conversation_id = state.next_id("chat");
        state.conversations.push(conversation_id.clone());
        state.memberships.push(Membership::new(
            conversation_id.clone(),
            requester_id,
            MembershipStatus::Accepted,
        ));
        state.memberships.push(Membership::new(
            conversation_id.clone(),
            target_id,
            MembershipStatus::Pending,
        ));
        Ok(conversation_id)
    }

    async fn delete(&self, conversation_id: &str) -> ChatResult<()> {
        {
            let mut state = self.state.write().await;
            if !state.has_conversation(conversation_id) {
                return Err(ChatError::conversation_not_found(conversation_id));
            }
            state
                .memberships
                .retain(|m| m.conversation_id != conversation_id);
        }

        MessageRepository::delete_for_conversation(self, conversation_id).await?;

        let mut state = self.state.write().await;
        state.conversations.retain(|id| id != conversation_id);
        // Dropping the sender ends every open subscription.
        state.channels.remove(conversation_id);
        Ok(())
    }

    async fn search_profiles(
        &self,
        query: &str,
        exclude_user_id: &str,
        limit: usize,
    ) -> ChatResult<Vec<Profile>> {
        let needle = query.trim().to_lowercase();
        let state = self.state.read().await;

        let mut matches: Vec<Profile> = state
            .profiles
            .values()
            .filter(|profile| profile.id != exclude_user_id)
            .filter(|profile| {
                profile.username.to_lowercase().contains(&needle)
                    || profile
                        .display_name
                        .as_deref()
                        .map(|name| name.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_increasing_timestamps() {
        let backend = InMemoryBackend::new();
        backend
            .add_conversation("c1", &[("u1", MembershipStatus::Accepted)])
            .await;

        let first = MessageRepository::insert(&backend, NewMessage::text("c1", "u1", "a"))
            .await
            .unwrap();
        let second = MessageRepository::insert(&backend, NewMessage::text("c1", "u1", "b"))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert!(second.created_at > first.created_at);
        assert_eq!(backend.history("c1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_into_unknown_conversation_fails() {
        let backend = InMemoryBackend::new();
        let result = MessageRepository::insert(&backend, NewMessage::text("nope", "u1", "a")).await;
        assert!(matches!(result, Err(ChatError::ConversationNotFound { .. })));
    }

    #[tokio::test]
    async fn test_subscription_receives_inserts() {
        let backend = InMemoryBackend::new();
        backend
            .add_conversation("c1", &[("u1", MembershipStatus::Accepted)])
            .await;

        let mut subscription = backend.subscribe("c1").await.unwrap();
        assert_eq!(backend.subscriber_count("c1").await, 1);

        MessageRepository::insert(&backend, NewMessage::text("c1", "u2", "hi"))
            .await
            .unwrap();
        let received = subscription.next().await.unwrap().unwrap();
        assert_eq!(received.text(), Some("hi"));

        subscription.unsubscribe();
        assert_eq!(backend.subscriber_count("c1").await, 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_gap_error() {
        let backend = InMemoryBackend::with_capacity(2);
        backend
            .add_conversation("c1", &[("u1", MembershipStatus::Accepted)])
            .await;
        let mut subscription = backend.subscribe("c1").await.unwrap();

        for n in 0..5 {
            MessageRepository::insert(&backend, NewMessage::text("c1", "u1", format!("m{n}")))
                .await
                .unwrap();
        }

        let gap = subscription.next().await.unwrap();
        assert!(matches!(gap, Err(ChatError::Lagged { skipped: 3 })));
        let next = subscription.next().await.unwrap().unwrap();
        assert_eq!(next.text(), Some("m3"));
    }

    #[tokio::test]
    async fn test_deleting_conversation_ends_subscription() {
        let backend = InMemoryBackend::new();
        backend
            .add_conversation("c1", &[("u1", MembershipStatus::Accepted)])
            .await;
        let mut subscription = backend.subscribe("c1").await.unwrap();

        ConversationRepository::delete(&backend, "c1").await.unwrap();
        assert!(subscription.next().await.is_none());
        assert!(subscription.is_ended());
    }

    #[tokio::test]
    async fn test_upload_and_delete_objects() {
        let backend = InMemoryBackend::new();
        let progress = ProgressReporter::new();

        let url = backend
            .upload("chat-files", "a.txt", Bytes::from_static(b"abc"), "text/plain", &progress)
            .await
            .unwrap();
        assert_eq!(url, "memory://chat-files/a.txt");
        assert!(progress.is_complete());
        assert!(backend.has_object("chat-files", "a.txt").await);

        let duplicate = backend
            .upload("chat-files", "a.txt", Bytes::from_static(b"abc"), "text/plain", &progress)
            .await;
        assert!(matches!(duplicate, Err(ChatError::AlreadyExists { .. })));

        ObjectStorage::delete(&backend, "chat-files", "a.txt").await.unwrap();
        assert!(!backend.has_object("chat-files", "a.txt").await);
        assert_eq!(backend.upload_count().await, 2);
        assert_eq!(backend.delete_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_upload_never_completes_progress() {
        let backend = InMemoryBackend::new();
        backend.fail_uploads_of_type("image/png").await;
        let progress = ProgressReporter::new();

        let result = backend
            .upload("chat-files", "a.png", Bytes::from_static(b"png"), "image/png", &progress)
            .await;
        assert!(matches!(result, Err(ChatError::Storage { .. })));
        assert!(!progress.is_complete());
        assert_eq!(backend.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_direct_conversation_lifecycle() {
        let backend = InMemoryBackend::new();
        let id = backend.create_direct("u1", "u2").await.unwrap();

        assert_eq!(backend.existing_direct("u2", "u1").await.unwrap(), Some(id.clone()));
        assert_eq!(
            backend.membership(&id, "u2").await.unwrap().status,
            MembershipStatus::Pending
        );

        MessageRepository::insert(&backend, NewMessage::text(id.clone(), "u1", "hey"))
            .await
            .unwrap();
        ConversationRepository::delete(&backend, &id).await.unwrap();

        assert!(backend.existing_direct("u1", "u2").await.unwrap().is_none());
        assert!(backend.messages_in(&id).await.is_empty());
        assert!(backend.list_for_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_profiles_excludes_self_and_limits() {
        let backend = InMemoryBackend::new();
        for (id, username) in [("u1", "alice"), ("u2", "alicia"), ("u3", "bob"), ("u4", "alina")] {
            backend
                .add_profile(Profile {
                    id: id.to_string(),
                    username: username.to_string(),
                    display_name: None,
                    avatar_url: None,
                })
                .await;
        }

        let found = backend.search_profiles("ALI", "u1", 1).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "alicia");
    }
}
