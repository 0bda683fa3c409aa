//! Upload pipeline: local blob to object storage to committed message.

use bytes::Bytes;
use chatify_config::ClientConfig;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::entities::{
    file_extension, AudioClip, FileSelection, Message, NewMessage, PendingAttachment,
};
use crate::repositories::BackendHandle;
use crate::types::{ChatResult, ProgressReporter, UserId};
use crate::utils::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    File,
    Voice,
}

/// A blob to be stored.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub kind: UploadKind,
    /// Logical name shown to the recipient
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadRequest {
    pub fn file(selection: &FileSelection) -> Self {
        Self {
            kind: UploadKind::File,
            file_name: selection.file_name.clone(),
            content_type: selection.content_type.clone(),
            bytes: selection.bytes.clone(),
        }
    }

    pub fn voice(clip: &AudioClip) -> Self {
        Self {
            kind: UploadKind::Voice,
            file_name: "voice message".to_string(),
            content_type: clip.content_type.clone(),
            bytes: clip.bytes.clone(),
        }
    }

    fn extension(&self) -> Option<String> {
        match self.kind {
            UploadKind::File => file_extension(&self.file_name),
            UploadKind::Voice => {
                let essence = self.content_type.split(';').next().unwrap_or_default();
                essence
                    .split_once('/')
                    .map(|(_, subtype)| subtype.trim().to_ascii_lowercase())
                    .filter(|subtype| !subtype.is_empty())
            }
        }
    }
}

/// A stored object that has not been referenced by a message yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub public_url: String,
    pub bucket: String,
    pub storage_path: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl UploadedObject {
    pub fn into_pending(self) -> PendingAttachment {
        PendingAttachment {
            public_url: self.public_url,
            file_name: self.file_name,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            bucket: self.bucket,
            storage_path: self.storage_path,
        }
    }
}

/// Key under which an upload is stored.
///
/// Voice notes use `voice_{millis}_{user}_{id}.{ext}` and files use
/// `file_{millis}_{user}_{id}.{ext}`; the extension is omitted when the
/// file name has none.
pub fn storage_key(kind: UploadKind, user_id: &str, extension: Option<&str>) -> String {
    let prefix = match kind {
        UploadKind::File => "file",
        UploadKind::Voice => "voice",
    };
    let base = format!(
        "{}_{}_{}_{}",
        prefix,
        Utc::now().timestamp_millis(),
        Validator::key_segment(user_id),
        cuid2::create_id()
    );
    match extension.and_then(Validator::key_extension) {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

/// Moves blobs into object storage and commits messages referencing them.
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    backend: BackendHandle,
    user_id: UserId,
    file_bucket: String,
    voice_bucket: String,
    max_file_size_bytes: u64,
}

impl UploadPipeline {
    pub fn new(backend: BackendHandle, config: &ClientConfig, user_id: impl Into<UserId>) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
            file_bucket: config.storage.file_bucket.clone(),
            voice_bucket: config.storage.voice_bucket.clone(),
            max_file_size_bytes: config.composer.max_file_size_bytes,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn bucket_for(&self, kind: UploadKind) -> &str {
        match kind {
            UploadKind::File => &self.file_bucket,
            UploadKind::Voice => &self.voice_bucket,
        }
    }

    /// Validate and store a blob.
    ///
    /// `progress` reaches 100 only after the store acknowledged the object.
    pub async fn upload(
        &self,
        request: UploadRequest,
        progress: &ProgressReporter,
    ) -> ChatResult<UploadedObject> {
        if request.kind == UploadKind::File {
            Validator::file_name(&request.file_name)?;
        }
        Validator::content_type(&request.content_type)?;
        let size_bytes = request.bytes.len() as u64;
        Validator::file_size(size_bytes, self.max_file_size_bytes)?;

        let extension = request.extension();
        let bucket = self.bucket_for(request.kind).to_string();
        let key = storage_key(request.kind, &self.user_id, extension.as_deref());

        debug!(bucket = %bucket, key = %key, size = size_bytes, "uploading object");
        let public_url = self
            .backend
            .storage
            .upload(&bucket, &key, request.bytes, &request.content_type, progress)
            .await?;
        progress.complete();

        info!(bucket = %bucket, key = %key, size = size_bytes, "uploaded object");
        Ok(UploadedObject {
            public_url,
            bucket,
            storage_path: key,
            file_name: request.file_name,
            content_type: request.content_type,
            size_bytes,
        })
    }

    /// Best-effort removal of an object that will not be sent.
    ///
    /// Returns whether the delete succeeded; failures are only logged.
    pub async fn discard(&self, bucket: &str, storage_path: &str) -> bool {
        match self.backend.storage.delete(bucket, storage_path).await {
            Ok(()) => {
                debug!(bucket, key = storage_path, "discarded object");
                true
            }
            Err(error) => {
                warn!(bucket, key = storage_path, ?error, "failed to discard object");
                false
            }
        }
    }

    pub async fn commit_file(
        &self,
        conversation_id: &str,
        attachment: &PendingAttachment,
    ) -> ChatResult<Message> {
        self.commit(NewMessage::file(
            conversation_id,
            self.user_id.clone(),
            attachment.stored_file(),
        ))
        .await
    }

    pub async fn commit_voice(
        &self,
        conversation_id: &str,
        object: &UploadedObject,
    ) -> ChatResult<Message> {
        self.commit(NewMessage::audio(
            conversation_id,
            self.user_id.clone(),
            object.public_url.clone(),
        ))
        .await
    }

    pub async fn commit(&self, message: NewMessage) -> ChatResult<Message> {
        let message = self.backend.messages.insert(message).await?;
        info!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            kind = %message.kind(),
            "committed message"
        );
        Ok(message)
    }
}
