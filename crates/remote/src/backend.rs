//! Backend ports implemented against the hosted platform.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chatify_chats::entities::{
    ConversationRecord, MemberProfile, Membership, MembershipStatus, Message, NewMessage,
    NewReaction, Profile, Reaction,
};
use chatify_chats::repositories::{
    BackendHandle, ConversationRepository, MembershipRepository, MessageRepository, ObjectStorage,
    ReactionRepository, RealtimeSource, Subscription,
};
use chatify_chats::types::{ConversationId, MessageId};
use chatify_chats::utils::decode;
use chatify_chats::{ChatError, ChatResult, ProgressReporter};
use chatify_config::ClientConfig;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::RemoteError;
use crate::realtime::RealtimeClient;
use crate::rest::{eq, in_list, Query, RestClient};

const MESSAGES: &str = "messages";
const MEMBERS: &str = "chat_members";
const CHATS: &str = "chats";
const REACTIONS: &str = "reactions";
const PROFILES: &str = "profiles";

const LISTING_SELECT: &str = "chat_id,status,user_id,chats(id,created_at,\
chat_members(chat_id,user_id,status,profiles(id,username,display_name,avatar_url)),\
messages(id,chat_id,sender_id,created_at,type,content,audio_url,file_url,file_name,file_type,file_size))";

/// Every backend port, served by the hosted platform.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    rest: RestClient,
    realtime: RealtimeClient,
}

impl RemoteBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            rest: RestClient::new(config)?,
            realtime: RealtimeClient::new(config),
        })
    }

    /// Connection handle wiring every port to this backend.
    pub fn into_handle(self) -> BackendHandle {
        BackendHandle::from_backend(Arc::new(self))
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    async fn chat_ids_of(&self, user_id: &str) -> ChatResult<Vec<ConversationId>> {
        let rows = self
            .rest
            .select(MEMBERS, &vec![("select", "chat_id".to_string()), ("user_id", eq(user_id))])
            .await?;
        rows.iter()
            .map(|row| match &row["chat_id"] {
                Value::String(id) => Ok(id.clone()),
                Value::Number(id) => Ok(id.to_string()),
                _ => Err(ChatError::decode("membership row without chat_id")),
            })
            .collect()
    }
}

/// Decode rows, logging and skipping the ones that fail validation.
fn decode_valid<T>(rows: &[Value], what: &str, decode: fn(&Value) -> ChatResult<T>) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(item) => Some(item),
            Err(error) => {
                warn!(what, %error, "skipping invalid row");
                None
            }
        })
        .collect()
}

fn first_row(rows: Vec<Value>, what: &str) -> ChatResult<Value> {
    rows.into_iter()
        .next()
        .ok_or_else(|| RemoteError::UnexpectedResponse(format!("{what} insert returned no row")).into())
}

fn listing_record(row: &Value) -> ChatResult<ConversationRecord> {
    let chat = &row["chats"];
    let conversation_id = match (&chat["id"], &row["chat_id"]) {
        (Value::String(id), _) | (_, Value::String(id)) => id.clone(),
        (Value::Number(id), _) | (_, Value::Number(id)) => id.to_string(),
        _ => return Err(ChatError::decode("conversation row without id")),
    };

    let mut members = Vec::new();
    for member in chat["chat_members"].as_array().into_iter().flatten() {
        let mut membership_row = member.clone();
        if membership_row.get("chat_id").is_none() {
            membership_row["chat_id"] = json!(conversation_id);
        }
        let membership = decode::membership_from_row(&membership_row)?;
        let profile = match &member["profiles"] {
            Value::Null => None,
            profile => {
                let mut profile_row = profile.clone();
                if profile_row.get("id").is_none() {
                    profile_row["id"] = json!(membership.user_id);
                }
                decode::profile_from_row(&profile_row).ok()
            }
        };
        members.push(MemberProfile { membership, profile });
    }

    let messages = chat["messages"].as_array().cloned().unwrap_or_default();
    let last_message = decode_valid(&messages, "message", decode::message_from_row)
        .into_iter()
        .max_by_key(|message| message.created_at);

    Ok(ConversationRecord {
        conversation_id,
        members,
        last_message,
    })
}

#[async_trait]
impl MessageRepository for RemoteBackend {
    async fn history(&self, conversation_id: &str) -> ChatResult<Vec<Message>> {
        let query: Query = vec![
            ("select", "*".to_string()),
            ("chat_id", eq(conversation_id)),
            ("order", "created_at.asc".to_string()),
        ];
        let rows = self.rest.select(MESSAGES, &query).await?;
        Ok(decode_valid(&rows, "message", decode::message_from_row))
    }

    async fn insert(&self, message: NewMessage) -> ChatResult<Message> {
        let rows = self.rest.insert(MESSAGES, &message.to_row()).await?;
        let stored = decode::message_from_row(&first_row(rows, "message")?)?;
        info!(conversation_id = %stored.conversation_id, message_id = %stored.id, kind = %stored.kind(), "message inserted");
        Ok(stored)
    }

    async fn delete_for_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        self.rest
            .delete(MESSAGES, &vec![("chat_id", eq(conversation_id))])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for RemoteBackend {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        progress: &ProgressReporter,
    ) -> ChatResult<String> {
        self.rest
            .upload_object(bucket, key, bytes, content_type, progress)
            .await
            .map_err(RemoteError::into_storage)
    }

    async fn delete(&self, bucket: &str, key: &str) -> ChatResult<()> {
        self.rest
            .delete_object(bucket, key)
            .await
            .map_err(RemoteError::into_storage)
    }
}

#[async_trait]
impl RealtimeSource for RemoteBackend {
    async fn subscribe(&self, conversation_id: &str) -> ChatResult<Subscription> {
        Ok(self.realtime.subscribe_conversation(conversation_id).await?)
    }
}

#[async_trait]
impl MembershipRepository for RemoteBackend {
    async fn memberships(&self, conversation_id: &str) -> ChatResult<Vec<Membership>> {
        let query: Query = vec![
            ("select", "chat_id,user_id,status".to_string()),
            ("chat_id", eq(conversation_id)),
        ];
        let rows = self.rest.select(MEMBERS, &query).await?;
        rows.iter().map(decode::membership_from_row).collect()
    }

    async fn update_status(
        &self,
        conversation_id: &str,
        user_id: &str,
        status: MembershipStatus,
    ) -> ChatResult<()> {
        let query: Query = vec![("chat_id", eq(conversation_id)), ("user_id", eq(user_id))];
        self.rest
            .update(MEMBERS, &query, &json!({ "status": status.as_str() }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReactionRepository for RemoteBackend {
    async fn for_messages(&self, message_ids: &[MessageId]) -> ChatResult<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query: Query = vec![("select", "*".to_string()), ("message_id", in_list(message_ids))];
        let rows = self.rest.select(REACTIONS, &query).await?;
        Ok(decode_valid(&rows, "reaction", decode::reaction_from_row))
    }

    async fn insert(&self, reaction: NewReaction) -> ChatResult<Reaction> {
        let rows = self.rest.insert(REACTIONS, &reaction.to_row()).await?;
        decode::reaction_from_row(&first_row(rows, "reaction")?)
    }

    async fn delete(&self, message_id: &str, user_id: &str, emoji: &str) -> ChatResult<()> {
        let query: Query = vec![
            ("message_id", eq(message_id)),
            ("user_id", eq(user_id)),
            ("emoji", eq(emoji)),
        ];
        self.rest.delete(REACTIONS, &query).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for RemoteBackend {
    async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<ConversationRecord>> {
        let query: Query = vec![
            ("select", LISTING_SELECT.to_string()),
            ("user_id", eq(user_id)),
        ];
        let rows = self.rest.select(MEMBERS, &query).await?;

        let mut records: Vec<(Option<String>, ConversationRecord)> = Vec::new();
        for row in &rows {
            match listing_record(row) {
                Ok(record) => {
                    let created = row["chats"]["created_at"].as_str().map(str::to_string);
                    records.push((created, record));
                }
                Err(error) => warn!(user_id, %error, "skipping invalid conversation row"),
            }
        }

        let activity = |(created, record): &(Option<String>, ConversationRecord)| {
            record
                .last_message
                .as_ref()
                .map(|message| message.created_at)
                .or_else(|| created.as_deref().and_then(|raw| decode::timestamp(raw).ok()))
        };
        records.sort_by(|a, b| activity(b).cmp(&activity(a)));
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    async fn existing_direct(&self, user_a: &str, user_b: &str) -> ChatResult<Option<ConversationId>> {
        let mine = self.chat_ids_of(user_a).await?;
        if mine.is_empty() {
            return Ok(None);
        }
        let query: Query = vec![
            ("select", "chat_id".to_string()),
            ("user_id", eq(user_b)),
            ("chat_id", in_list(&mine)),
        ];
        let shared = self.rest.select(MEMBERS, &query).await?;
        Ok(shared.first().and_then(|row| match &row["chat_id"] {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }))
    }

    async fn create_direct(&self, requester_id: &str, target_id: &str) -> ChatResult<ConversationId> {
        let chat = first_row(
            self.rest.insert(CHATS, &json!({ "is_group": false })).await?,
            "chat",
        )?;
        let conversation_id = match &chat["id"] {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return Err(ChatError::decode("chat row without id")),
        };

        let members = json!([
            { "chat_id": conversation_id, "user_id": requester_id, "status": MembershipStatus::Accepted.as_str() },
            { "chat_id": conversation_id, "user_id": target_id, "status": MembershipStatus::Pending.as_str() },
        ]);
        self.rest.insert(MEMBERS, &members).await?;
        info!(conversation_id = %conversation_id, requester_id, target_id, "conversation requested");
        Ok(conversation_id)
    }

    async fn delete(&self, conversation_id: &str) -> ChatResult<()> {
        self.rest
            .delete(MEMBERS, &vec![("chat_id", eq(conversation_id))])
            .await?;
        self.rest
            .delete(MESSAGES, &vec![("chat_id", eq(conversation_id))])
            .await?;
        self.rest
            .delete(CHATS, &vec![("id", eq(conversation_id))])
            .await?;
        info!(conversation_id, "conversation deleted");
        Ok(())
    }

    async fn search_profiles(
        &self,
        query: &str,
        exclude_user_id: &str,
        limit: usize,
    ) -> ChatResult<Vec<Profile>> {
        let pattern: String = query
            .chars()
            .filter(|c| !matches!(c, ',' | '(' | ')' | '*'))
            .collect();
        let filters: Query = vec![
            ("select", "id,username,display_name,avatar_url".to_string()),
            (
                "or",
                format!("(username.ilike.*{pattern}*,display_name.ilike.*{pattern}*)"),
            ),
            ("id", format!("neq.{exclude_user_id}")),
            ("order", "username.asc".to_string()),
            ("limit", limit.to_string()),
        ];
        let rows = self.rest.select(PROFILES, &filters).await?;
        Ok(decode_valid(&rows, "profile", decode::profile_from_row))
    }
}
