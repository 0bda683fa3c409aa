//! Validating decode of loosely-typed backend rows.
//!
//! Every row that crosses the backend boundary goes through one of these
//! functions before it becomes a domain entity. Rows with missing required
//! fields, unknown kinds or statuses, or inconsistent attachment metadata are
//! rejected with [`ChatError::Decode`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::entities::{
    Membership, MembershipStatus, Message, MessageBody, MessageKind, Profile, Reaction, StoredFile,
};
use crate::types::{ChatError, ChatResult};

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

pub fn message_from_row(row: &Value) -> ChatResult<Message> {
    let fields = as_object(row, "message")?;

    let id = required_id(fields, "id")?;
    let conversation_id = required_id(fields, "chat_id")?;
    let sender_id = required_id(fields, "sender_id")?;
    let created_at = timestamp(required_str(fields, "created_at")?)?;

    let kind = match optional_str(fields, "type")? {
        Some(kind) => kind.parse::<MessageKind>()?,
        // Rows written before the type column existed.
        None if optional_str(fields, "audio_url")?.is_some() => MessageKind::Audio,
        None if optional_str(fields, "file_url")?.is_some() => MessageKind::File,
        None => MessageKind::Text,
    };

    let body = match kind {
        MessageKind::Text => MessageBody::Text {
            content: required_str(fields, "content")?.to_string(),
        },
        MessageKind::Audio => MessageBody::Audio {
            url: optional_str(fields, "audio_url")?
                .ok_or_else(|| ChatError::decode(format!("audio message {id} has no audio_url")))?
                .to_string(),
        },
        MessageKind::File => {
            let url = optional_str(fields, "file_url")?
                .ok_or_else(|| ChatError::decode(format!("file message {id} has no file_url")))?;
            let name = optional_str(fields, "file_name")?
                .ok_or_else(|| ChatError::decode(format!("file message {id} has no file_name")))?;
            let content_type = optional_str(fields, "file_type")?.unwrap_or(DEFAULT_FILE_TYPE);
            let size_bytes = match fields.get("file_size") {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_u64().ok_or_else(|| {
                    ChatError::decode(format!("file message {id} has an invalid file_size"))
                })?,
            };

            MessageBody::File(StoredFile {
                url: url.to_string(),
                name: name.to_string(),
                content_type: content_type.to_string(),
                size_bytes,
            })
        }
    };

    Ok(Message {
        id,
        conversation_id,
        sender_id,
        created_at,
        body,
    })
}

pub fn membership_from_row(row: &Value) -> ChatResult<Membership> {
    let fields = as_object(row, "membership")?;

    Ok(Membership {
        conversation_id: required_id(fields, "chat_id")?,
        user_id: required_id(fields, "user_id")?,
        status: required_str(fields, "status")?.parse::<MembershipStatus>()?,
    })
}

pub fn reaction_from_row(row: &Value) -> ChatResult<Reaction> {
    let fields = as_object(row, "reaction")?;

    let emoji = required_str(fields, "emoji")?;
    if emoji.trim().is_empty() {
        return Err(ChatError::decode("reaction has an empty emoji"));
    }

    Ok(Reaction {
        id: required_id(fields, "id")?,
        message_id: required_id(fields, "message_id")?,
        user_id: required_id(fields, "user_id")?,
        emoji: emoji.to_string(),
        created_at: optional_str(fields, "created_at")?.map(timestamp).transpose()?,
    })
}

pub fn profile_from_row(row: &Value) -> ChatResult<Profile> {
    let fields = as_object(row, "profile")?;

    Ok(Profile {
        id: required_id(fields, "id")?,
        username: required_str(fields, "username")?.to_string(),
        display_name: optional_str(fields, "display_name")?.map(str::to_string),
        avatar_url: optional_str(fields, "avatar_url")?.map(str::to_string),
    })
}

/// Parse a backend timestamp. Accepts RFC 3339 and the offset-less form
/// emitted by change notifications, which is UTC.
pub fn timestamp(raw: &str) -> ChatResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))?;
    Ok(naive.and_utc())
}

fn as_object<'a>(row: &'a Value, what: &str) -> ChatResult<&'a Map<String, Value>> {
    row.as_object()
        .ok_or_else(|| ChatError::decode(format!("{what} row is not an object")))
}

fn required_str<'a>(fields: &'a Map<String, Value>, key: &str) -> ChatResult<&'a str> {
    match fields.get(key) {
        Some(Value::String(value)) => Ok(value),
        Some(Value::Null) | None => Err(ChatError::decode(format!("missing field '{key}'"))),
        Some(_) => Err(ChatError::decode(format!("field '{key}' is not a string"))),
    }
}

/// Empty strings count as absent.
fn optional_str<'a>(fields: &'a Map<String, Value>, key: &str) -> ChatResult<Option<&'a str>> {
    match fields.get(key) {
        Some(Value::String(value)) if value.is_empty() => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(ChatError::decode(format!("field '{key}' is not a string"))),
    }
}

/// Identifiers may be uuids or bigint keys depending on the table.
fn required_id(fields: &Map<String, Value>, key: &str) -> ChatResult<String> {
    match fields.get(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        Some(Value::Number(value)) => Ok(value.to_string()),
        Some(Value::Null) | None => Err(ChatError::decode(format!("missing field '{key}'"))),
        Some(_) => Err(ChatError::decode(format!("field '{key}' is not an identifier"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_row_decodes() {
        let message = message_from_row(&json!({
            "id": "m1",
            "chat_id": "c1",
            "sender_id": "u1",
            "created_at": "2024-05-01T10:00:00.123456+00:00",
            "content": "hello",
            "type": "text",
        }))
        .unwrap();

        assert_eq!(message.id, "m1");
        assert_eq!(message.text(), Some("hello"));
    }

    #[test]
    fn test_untyped_row_with_content_is_text() {
        let message = message_from_row(&json!({
            "id": 7,
            "chat_id": "c1",
            "sender_id": "u1",
            "created_at": "2024-05-01T10:00:00Z",
            "content": "plain",
        }))
        .unwrap();

        assert_eq!(message.id, "7");
        assert_eq!(message.kind(), MessageKind::Text);
    }

    #[test]
    fn test_legacy_audio_row_decodes_as_audio() {
        let message = message_from_row(&json!({
            "id": "m2",
            "chat_id": "c1",
            "sender_id": "u1",
            "created_at": "2024-05-01 10:00:00+00",
            "content": "",
            "audio_url": "https://cdn.example.co/voice.webm",
        }))
        .unwrap();

        assert_eq!(message.kind(), MessageKind::Audio);
        assert_eq!(message.attachment_url(), Some("https://cdn.example.co/voice.webm"));
    }

    #[test]
    fn test_file_row_decodes_metadata() {
        let message = message_from_row(&json!({
            "id": "m3",
            "chat_id": "c1",
            "sender_id": "u1",
            "created_at": "2024-05-01T10:00:00",
            "type": "file",
            "content": "",
            "file_url": "https://cdn.example.co/a.pdf",
            "file_name": "a.pdf",
            "file_type": "application/pdf",
            "file_size": 1234,
        }))
        .unwrap();

        match message.body {
            MessageBody::File(file) => {
                assert_eq!(file.name, "a.pdf");
                assert_eq!(file.size_bytes, 1234);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed_rows() {
        let base = json!({
            "id": "m1",
            "chat_id": "c1",
            "sender_id": "u1",
            "created_at": "2024-05-01T10:00:00Z",
        });

        let mut unknown = base.clone();
        unknown["type"] = json!("sticker");
        assert!(matches!(message_from_row(&unknown), Err(ChatError::Decode { .. })));

        let mut audio_without_url = base.clone();
        audio_without_url["type"] = json!("audio");
        assert!(message_from_row(&audio_without_url).is_err());

        let mut file_without_name = base.clone();
        file_without_name["type"] = json!("file");
        file_without_name["file_url"] = json!("https://cdn.example.co/x");
        assert!(message_from_row(&file_without_name).is_err());

        let mut negative_size = file_without_name.clone();
        negative_size["file_name"] = json!("x");
        negative_size["file_size"] = json!(-1);
        assert!(message_from_row(&negative_size).is_err());

        let mut bad_time = base.clone();
        bad_time["content"] = json!("hi");
        bad_time["created_at"] = json!("yesterday");
        assert!(message_from_row(&bad_time).is_err());

        assert!(message_from_row(&json!({"id": "m1"})).is_err());
        assert!(message_from_row(&json!("not an object")).is_err());
    }

    #[test]
    fn test_membership_row() {
        let membership = membership_from_row(&json!({
            "chat_id": "c1",
            "user_id": "u1",
            "status": "pending",
        }))
        .unwrap();
        assert_eq!(membership.status, MembershipStatus::Pending);

        assert!(membership_from_row(&json!({
            "chat_id": "c1",
            "user_id": "u1",
            "status": "banned",
        }))
        .is_err());
    }

    #[test]
    fn test_reaction_and_profile_rows() {
        let reaction = reaction_from_row(&json!({
            "id": 1,
            "message_id": "m1",
            "user_id": "u1",
            "emoji": "🔥",
        }))
        .unwrap();
        assert_eq!(reaction.id, "1");
        assert!(reaction.created_at.is_none());

        let profile = profile_from_row(&json!({
            "id": "u2",
            "username": "ada",
            "display_name": null,
        }))
        .unwrap();
        assert_eq!(profile.label(), "ada");
        assert!(profile_from_row(&json!({"id": "u2"})).is_err());
    }
}
