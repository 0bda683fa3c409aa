use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::message::StoredFile;

/// An uploaded object waiting to be committed as a message.
///
/// Exists only between upload completion and send or cancel. The bucket and
/// storage path are kept so that cancelling can delete the object again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttachment {
    /// Public retrieval URL returned by object storage
    pub public_url: String,
    /// Original file name as picked by the user
    pub file_name: String,
    /// MIME type
    pub content_type: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Bucket holding the object
    pub bucket: String,
    /// Key of the object inside the bucket
    pub storage_path: String,
}

impl PendingAttachment {
    pub fn category(&self) -> AttachmentCategory {
        AttachmentCategory::from_mime(&self.content_type)
    }

    pub fn formatted_size(&self) -> String {
        formatted_size(self.size_bytes)
    }

    /// Metadata carried by the committed file message.
    pub fn stored_file(&self) -> StoredFile {
        StoredFile {
            url: self.public_url.clone(),
            name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// A file picked from the local filesystem, not uploaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl FileSelection {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercased extension of the file name, if it has one.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.file_name)
    }
}

/// Locally captured voice recording, discarded after upload or cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Bytes,
    pub content_type: String,
    pub duration: Duration,
}

impl AudioClip {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Attachment category used to pick a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentCategory {
    Image,
    Video,
    Audio,
    Pdf,
    Archive,
    Spreadsheet,
    Text,
    Other,
}

impl AttachmentCategory {
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_ascii_lowercase().as_str() {
            s if s.starts_with("image/") => AttachmentCategory::Image,
            s if s.starts_with("video/") => AttachmentCategory::Video,
            s if s.starts_with("audio/") => AttachmentCategory::Audio,
            s if s.contains("pdf") => AttachmentCategory::Pdf,
            s if s.contains("zip") || s.contains("rar") || s.contains("tar") => {
                AttachmentCategory::Archive
            }
            s if s.contains("csv") || s.contains("spreadsheet") || s.contains("excel") => {
                AttachmentCategory::Spreadsheet
            }
            s if s.contains("text") => AttachmentCategory::Text,
            _ => AttachmentCategory::Other,
        }
    }

    pub fn is_previewable(&self) -> bool {
        matches!(self, AttachmentCategory::Image | AttachmentCategory::Video)
    }
}

/// Lowercased extension of a file name. Dotfiles have none.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Human-readable file size.
pub fn formatted_size(size_bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size_bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size_bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
