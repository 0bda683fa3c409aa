//! Voice capture for the composer.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::time::Instant;
use tracing::debug;

use crate::entities::AudioClip;
use crate::types::{ChatError, ChatResult};

/// Source of microphone access.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request exclusive access to the microphone.
    ///
    /// Fails with [`ChatError::CaptureDenied`] when permission is refused
    /// and [`ChatError::CaptureUnavailable`] when there is no usable device.
    async fn acquire(&self) -> ChatResult<Box<dyn CaptureHandle>>;
}

/// Exclusively owned handle on an active capture.
///
/// Consuming methods release the device before returning.
pub trait CaptureHandle: Send {
    fn pause(&mut self);

    fn resume(&mut self);

    /// Stop capturing and return the encoded audio.
    fn finish(self: Box<Self>) -> ChatResult<Bytes>;

    /// Stop capturing and drop whatever was recorded.
    fn release(self: Box<Self>);
}

/// A voice message being captured.
pub struct RecordingSession {
    handle: Box<dyn CaptureHandle>,
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl RecordingSession {
    pub fn start(handle: Box<dyn CaptureHandle>) -> Self {
        Self {
            handle,
            accumulated: Duration::ZERO,
            running_since: Some(Instant::now()),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.running_since.is_none()
    }

    /// Recorded time, frozen while paused.
    pub fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
            self.handle.pause();
        }
    }

    pub fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
            self.handle.resume();
        }
    }

    /// Stop and produce the clip. The device is released either way.
    pub fn finish(self, content_type: &str) -> ChatResult<AudioClip> {
        let duration = self.elapsed();
        let bytes = self.handle.finish()?;
        if bytes.is_empty() {
            return Err(ChatError::capture_unavailable("recording produced no audio"));
        }

        debug!(millis = duration.as_millis() as u64, size = bytes.len(), "recording finished");
        Ok(AudioClip {
            bytes,
            content_type: content_type.to_string(),
            duration,
        })
    }

    pub fn cancel(self) {
        self.handle.release();
    }
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("elapsed", &self.elapsed())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

/// Format a duration as `mm:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Ready,
    Denied,
    Missing,
}

/// Capture device that produces a fixed chunk of audio per resume period.
///
/// Tracks how many handles are live so callers can check that a cancelled
/// recording gave the device back.
#[derive(Debug, Clone)]
pub struct ScriptedCaptureDevice {
    chunk: Bytes,
    availability: Availability,
    active: Arc<AtomicUsize>,
    acquisitions: Arc<AtomicUsize>,
}

impl ScriptedCaptureDevice {
    pub fn new(chunk: impl Into<Bytes>) -> Self {
        Self {
            chunk: chunk.into(),
            availability: Availability::Ready,
            active: Arc::new(AtomicUsize::new(0)),
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Device whose permission prompt is always refused.
    pub fn denied() -> Self {
        Self {
            availability: Availability::Denied,
            ..Self::new(Bytes::new())
        }
    }

    /// Host without any capture device.
    pub fn missing() -> Self {
        Self {
            availability: Availability::Missing,
            ..Self::new(Bytes::new())
        }
    }

    /// Handles currently holding the device.
    pub fn active_handles(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for ScriptedCaptureDevice {
    async fn acquire(&self) -> ChatResult<Box<dyn CaptureHandle>> {
        match self.availability {
            Availability::Denied => {
                return Err(ChatError::capture_denied("microphone permission refused"))
            }
            Availability::Missing => {
                return Err(ChatError::capture_unavailable("no capture device found"))
            }
            Availability::Ready => {}
        }

        if self
            .active
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ChatError::capture_unavailable("capture device is busy"));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&self.chunk);
        Ok(Box::new(ScriptedHandle {
            chunk: self.chunk.clone(),
            buffer,
            active: Arc::clone(&self.active),
            released: false,
        }))
    }
}

struct ScriptedHandle {
    chunk: Bytes,
    buffer: BytesMut,
    active: Arc<AtomicUsize>,
    released: bool,
}

impl ScriptedHandle {
    fn release_device(&mut self) {
        if !self.released {
            self.released = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl CaptureHandle for ScriptedHandle {
    fn pause(&mut self) {}

    fn resume(&mut self) {
        self.buffer.extend_from_slice(&self.chunk);
    }

    fn finish(mut self: Box<Self>) -> ChatResult<Bytes> {
        self.release_device();
        Ok(std::mem::take(&mut self.buffer).freeze())
    }

    fn release(mut self: Box<Self>) {
        self.release_device();
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        self.release_device();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "01:15");
        assert_eq!(format_elapsed(Duration::from_millis(3_999)), "00:03");
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_freezes_while_paused() {
        let device = ScriptedCaptureDevice::new(vec![1u8, 2, 3]);
        let mut session = RecordingSession::start(device.acquire().await.unwrap());

        tokio::time::advance(Duration::from_secs(3)).await;
        session.pause();
        assert!(session.is_paused());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(session.elapsed(), Duration::from_secs(3));

        session.resume();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(session.elapsed(), Duration::from_secs(5));

        let clip = session.finish("audio/webm").unwrap();
        assert_eq!(clip.duration, Duration::from_secs(5));
        assert_eq!(clip.bytes.len(), 6);
        assert_eq!(device.active_handles(), 0);
    }

    #[tokio::test]
    async fn test_device_is_exclusive_until_released() {
        let device = ScriptedCaptureDevice::new(vec![1u8]);
        let session = RecordingSession::start(device.acquire().await.unwrap());

        assert!(matches!(
            device.acquire().await,
            Err(ChatError::CaptureUnavailable { .. })
        ));

        session.cancel();
        assert_eq!(device.active_handles(), 0);
        assert!(device.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_denied_and_missing_devices() {
        assert!(matches!(
            ScriptedCaptureDevice::denied().acquire().await,
            Err(ChatError::CaptureDenied { .. })
        ));
        assert!(matches!(
            ScriptedCaptureDevice::missing().acquire().await,
            Err(ChatError::CaptureUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_recording_is_rejected() {
        let device = ScriptedCaptureDevice::new(Bytes::new());
        let session = RecordingSession::start(device.acquire().await.unwrap());
        assert!(session.finish("audio/webm").is_err());
        assert_eq!(device.active_handles(), 0);
    }
}
