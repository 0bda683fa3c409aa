//! Object storage over HTTP.

use bytes::Bytes;
use chatify_chats::ProgressReporter;
use futures_util::stream;
use reqwest::{Body, Method};
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::rest::{checked, RestClient};

const CHUNK_SIZE: usize = 64 * 1024;

impl RestClient {
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url(),
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    /// Stream `bytes` to storage. Progress follows the bytes handed to the
    /// transport and only completes once the store answered.
    pub async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        progress: &ProgressReporter,
    ) -> Result<String, RemoteError> {
        let path = object_path(bucket, key);
        let total = bytes.len();
        let body = Body::wrap_stream(chunked(bytes, progress.clone()));

        let response = self
            .request(Method::POST, &path)
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(body)
            .send()
            .await?;
        checked(response, "POST", &path).await?;

        progress.complete();
        info!(bucket, key, size = total, "object stored");
        Ok(self.public_url(bucket, key))
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), RemoteError> {
        let path = object_path(bucket, key);
        let response = self.request(Method::DELETE, &path).send().await?;
        checked(response, "DELETE", &path).await?;
        debug!(bucket, key, "object deleted");
        Ok(())
    }
}

/// Bucket and key are each encoded as one path segment.
fn object_path(bucket: &str, key: &str) -> String {
    format!(
        "/storage/v1/object/{}/{}",
        urlencoding::encode(bucket),
        urlencoding::encode(key)
    )
}

fn chunked(
    bytes: Bytes,
    progress: ProgressReporter,
) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = bytes.len().max(1);
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len())))
        .collect();

    let mut sent = 0usize;
    stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len();
        progress.advance((sent * 100 / total).min(99) as u8);
        Ok(chunk)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_chunked_progress_stays_below_complete() {
        let progress = ProgressReporter::new();
        let bytes = Bytes::from(vec![0u8; CHUNK_SIZE * 2 + 10]);
        let chunks: Vec<_> = chunked(bytes, progress.clone()).collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref().unwrap().len(), 10);
        assert_eq!(progress.percent(), 99);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_paths() {
        assert_eq!(object_path("chat-files", "a.txt"), "/storage/v1/object/chat-files/a.txt");
        assert_eq!(
            object_path("chat-files", "../avatars/x y.png"),
            "/storage/v1/object/chat-files/..%2Favatars%2Fx%20y.png"
        );
    }
}
