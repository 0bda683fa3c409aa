//! Composer: one outgoing message unit per send action.
//!
//! The attachment arm is an explicit state machine. Text, a voice note and
//! staged files are mutually exclusive because each lives in its own
//! [`ComposerState`] variant:
//!
//! ```text
//! Idle --start--> Recording <--pause/resume--> RecordingPaused
//! Recording | RecordingPaused --stop--> AudioStaged
//! AudioStaged --send | cancel--> Idle
//! Idle --stage files--> FilesStaged --send all | cancel--> Idle
//! ```

use std::sync::Arc;
use std::time::Duration;

use chatify_config::ComposerConfig;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::recording::{CaptureDevice, RecordingSession};
use super::upload::{UploadPipeline, UploadRequest};
use crate::entities::{AudioClip, FileSelection, Message, NewMessage, PendingAttachment};
use crate::types::{ChatError, ChatResult, ConversationId, ProgressReporter};
use crate::utils::Validator;

/// State of the attachment arm.
#[derive(Debug, Default)]
pub enum ComposerState {
    #[default]
    Idle,
    Recording(RecordingSession),
    RecordingPaused(RecordingSession),
    AudioStaged(AudioClip),
    FilesStaged(Vec<PendingAttachment>),
}

/// Payload-free view of [`ComposerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerMode {
    Idle,
    Recording,
    RecordingPaused,
    AudioStaged,
    FilesStaged,
}

impl ComposerState {
    pub fn mode(&self) -> ComposerMode {
        match self {
            ComposerState::Idle => ComposerMode::Idle,
            ComposerState::Recording(_) => ComposerMode::Recording,
            ComposerState::RecordingPaused(_) => ComposerMode::RecordingPaused,
            ComposerState::AudioStaged(_) => ComposerMode::AudioStaged,
            ComposerState::FilesStaged(_) => ComposerMode::FilesStaged,
        }
    }
}

/// Which composer controls are usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposerControls {
    pub text_send: bool,
    pub file_picker: bool,
    pub record: bool,
    pub pause: bool,
    pub resume: bool,
    pub stop: bool,
    pub send_attachment: bool,
    pub cancel: bool,
}

/// Keyboard input relevant to the text entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Enter { shift: bool },
    Char(char),
    Backspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The caller should send the draft.
    Send,
    Newline,
    Edited,
    Ignored,
}

/// A file that could not be staged or sent.
#[derive(Debug)]
pub struct FileFailure {
    pub file_name: String,
    pub error: ChatError,
}

/// Outcome of staging a file selection.
#[derive(Debug, Default)]
pub struct StageReport {
    pub staged: Vec<PendingAttachment>,
    pub failures: Vec<FileFailure>,
}

/// Outcome of sending staged files.
#[derive(Debug, Default)]
pub struct SendReport {
    pub sent: Vec<Message>,
    pub failures: Vec<FileFailure>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Composer for one conversation.
pub struct Composer {
    conversation_id: ConversationId,
    state: ComposerState,
    draft: String,
    pipeline: UploadPipeline,
    device: Arc<dyn CaptureDevice>,
    max_text_length: usize,
    voice_content_type: String,
    progress: ProgressReporter,
}

impl Composer {
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        pipeline: UploadPipeline,
        device: Arc<dyn CaptureDevice>,
        config: &ComposerConfig,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            state: ComposerState::Idle,
            draft: String::new(),
            pipeline,
            device,
            max_text_length: config.max_text_length,
            voice_content_type: config.voice_content_type.clone(),
            progress: ProgressReporter::new(),
        }
    }

    pub fn state(&self) -> &ComposerState {
        &self.state
    }

    pub fn mode(&self) -> ComposerMode {
        self.state.mode()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Progress of the upload currently or most recently in flight.
    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn staged_files(&self) -> &[PendingAttachment] {
        match &self.state {
            ComposerState::FilesStaged(files) => files,
            _ => &[],
        }
    }

    pub fn staged_audio(&self) -> Option<&AudioClip> {
        match &self.state {
            ComposerState::AudioStaged(clip) => Some(clip),
            _ => None,
        }
    }

    pub fn recording_elapsed(&self) -> Option<Duration> {
        match &self.state {
            ComposerState::Recording(session) | ComposerState::RecordingPaused(session) => {
                Some(session.elapsed())
            }
            _ => None,
        }
    }

    pub fn controls(&self) -> ComposerControls {
        match &self.state {
            ComposerState::Idle => ComposerControls {
                text_send: !self.draft.trim().is_empty(),
                file_picker: true,
                record: true,
                ..ComposerControls::default()
            },
            ComposerState::Recording(_) => ComposerControls {
                pause: true,
                stop: true,
                cancel: true,
                ..ComposerControls::default()
            },
            ComposerState::RecordingPaused(_) => ComposerControls {
                resume: true,
                stop: true,
                cancel: true,
                ..ComposerControls::default()
            },
            ComposerState::AudioStaged(_) | ComposerState::FilesStaged(_) => ComposerControls {
                send_attachment: true,
                cancel: true,
                ..ComposerControls::default()
            },
        }
    }

    /// Apply a key press to the draft.
    ///
    /// Enter without shift asks for a send when the text send control is
    /// enabled; with shift it inserts a line break.
    pub fn handle_key(&mut self, key: KeyPress) -> KeyOutcome {
        match key {
            KeyPress::Enter { shift: true } => {
                self.draft.push('\n');
                KeyOutcome::Newline
            }
            KeyPress::Enter { shift: false } => {
                if self.controls().text_send {
                    KeyOutcome::Send
                } else {
                    KeyOutcome::Ignored
                }
            }
            KeyPress::Char(c) => {
                self.draft.push(c);
                KeyOutcome::Edited
            }
            KeyPress::Backspace => {
                if self.draft.pop().is_some() {
                    KeyOutcome::Edited
                } else {
                    KeyOutcome::Ignored
                }
            }
        }
    }

    /// Send the draft as a text message. The draft is kept on failure.
    pub async fn send_text(&mut self) -> ChatResult<Message> {
        self.require_idle("send text")?;
        let content = Validator::message_content(&self.draft, self.max_text_length)?;

        let message = self
            .pipeline
            .commit(NewMessage::text(
                self.conversation_id.clone(),
                self.pipeline.user_id(),
                content,
            ))
            .await?;
        self.draft.clear();
        Ok(message)
    }

    /// Acquire the microphone and start recording.
    ///
    /// On failure the composer stays idle and holds no capture handle.
    pub async fn start_recording(&mut self) -> ChatResult<()> {
        self.require_idle("start recording")?;

        let handle = self.device.acquire().await.map_err(|error| {
            warn!(conversation_id = %self.conversation_id, ?error, "capture device refused");
            error
        })?;
        self.state = ComposerState::Recording(RecordingSession::start(handle));
        info!(conversation_id = %self.conversation_id, "recording started");
        Ok(())
    }

    pub fn pause_recording(&mut self) -> ChatResult<()> {
        match self.take_state() {
            ComposerState::Recording(mut session) => {
                session.pause();
                self.state = ComposerState::RecordingPaused(session);
                debug!(conversation_id = %self.conversation_id, "recording paused");
                Ok(())
            }
            other => self.restore(other, "pause recording"),
        }
    }

    pub fn resume_recording(&mut self) -> ChatResult<()> {
        match self.take_state() {
            ComposerState::RecordingPaused(mut session) => {
                session.resume();
                self.state = ComposerState::Recording(session);
                debug!(conversation_id = %self.conversation_id, "recording resumed");
                Ok(())
            }
            other => self.restore(other, "resume recording"),
        }
    }

    /// Stop recording and stage the captured clip.
    ///
    /// The device is released in every case; a failed capture leaves the
    /// composer idle.
    pub fn stop_recording(&mut self) -> ChatResult<()> {
        match self.take_state() {
            ComposerState::Recording(session) | ComposerState::RecordingPaused(session) => {
                let clip = session.finish(&self.voice_content_type)?;
                info!(
                    conversation_id = %self.conversation_id,
                    millis = clip.duration.as_millis() as u64,
                    "voice note staged"
                );
                self.state = ComposerState::AudioStaged(clip);
                Ok(())
            }
            other => self.restore(other, "stop recording"),
        }
    }

    /// Abandon the recording and release the device immediately.
    pub fn cancel_recording(&mut self) -> ChatResult<()> {
        match self.take_state() {
            ComposerState::Recording(session) | ComposerState::RecordingPaused(session) => {
                session.cancel();
                info!(conversation_id = %self.conversation_id, "recording cancelled");
                Ok(())
            }
            other => self.restore(other, "cancel recording"),
        }
    }

    /// Drop the staged voice note without sending it.
    pub fn discard_audio(&mut self) -> ChatResult<()> {
        match self.take_state() {
            ComposerState::AudioStaged(_) => {
                debug!(conversation_id = %self.conversation_id, "voice note discarded");
                Ok(())
            }
            other => self.restore(other, "discard voice note"),
        }
    }

    /// Upload and commit the staged voice note.
    ///
    /// On failure the clip stays staged. An object that was stored but could
    /// not be referenced by a message is deleted again.
    pub async fn send_audio(&mut self) -> ChatResult<Message> {
        let clip = match &self.state {
            ComposerState::AudioStaged(clip) => clip.clone(),
            _ => return Err(self.unavailable("send voice note")),
        };

        self.progress.reset();
        let object = self
            .pipeline
            .upload(UploadRequest::voice(&clip), &self.progress)
            .await?;

        match self.pipeline.commit_voice(&self.conversation_id, &object).await {
            Ok(message) => {
                self.state = ComposerState::Idle;
                Ok(message)
            }
            Err(error) => {
                self.pipeline
                    .discard(&object.bucket, &object.storage_path)
                    .await;
                Err(error)
            }
        }
    }

    /// Upload every selected file concurrently and stage the successes.
    ///
    /// Failures are reported per file and do not affect the others. The
    /// composer only moves to `FilesStaged` when at least one file landed.
    pub async fn stage_files(&mut self, files: Vec<FileSelection>) -> ChatResult<StageReport> {
        self.require_idle("stage files")?;
        if files.is_empty() {
            return Err(ChatError::validation("No files selected"));
        }

        self.progress.reset();
        let reporters = self.progress.split(files.len());
        let pipeline = self.pipeline.clone();

        let uploads = files.iter().zip(reporters.iter()).map(|(file, progress)| {
            let pipeline = &pipeline;
            async move {
                let result = pipeline.upload(UploadRequest::file(file), progress).await;
                (file.file_name.clone(), result)
            }
        });
        let results = join_all(uploads).await;

        let mut report = StageReport::default();
        for (file_name, result) in results {
            match result {
                Ok(object) => report.staged.push(object.into_pending()),
                Err(error) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        file_name = %file_name,
                        ?error,
                        "file upload failed"
                    );
                    report.failures.push(FileFailure { file_name, error });
                }
            }
        }

        if !report.staged.is_empty() {
            self.state = ComposerState::FilesStaged(report.staged.clone());
        }
        info!(
            conversation_id = %self.conversation_id,
            staged = report.staged.len(),
            failed = report.failures.len(),
            "files staged"
        );
        Ok(report)
    }

    /// Remove one staged file and delete its object.
    pub async fn remove_staged(&mut self, index: usize) -> ChatResult<PendingAttachment> {
        let mut files = match self.take_state() {
            ComposerState::FilesStaged(files) => files,
            other => return self.restore(other, "remove staged file"),
        };
        if index >= files.len() {
            self.state = ComposerState::FilesStaged(files);
            return Err(ChatError::validation(format!("No staged file at {index}")));
        }

        let removed = files.remove(index);
        if !files.is_empty() {
            self.state = ComposerState::FilesStaged(files);
        }
        self.pipeline
            .discard(&removed.bucket, &removed.storage_path)
            .await;
        Ok(removed)
    }

    /// Commit one message per staged file.
    ///
    /// Committed files leave the stage. Files whose insert failed stay
    /// staged so they can be retried or cancelled.
    pub async fn send_staged(&mut self) -> ChatResult<SendReport> {
        let files = match self.take_state() {
            ComposerState::FilesStaged(files) => files,
            other => return self.restore(other, "send staged files"),
        };

        let mut report = SendReport::default();
        let mut remaining = Vec::new();
        for attachment in files {
            match self
                .pipeline
                .commit_file(&self.conversation_id, &attachment)
                .await
            {
                Ok(message) => report.sent.push(message),
                Err(error) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        file_name = %attachment.file_name,
                        ?error,
                        "failed to commit staged file"
                    );
                    report.failures.push(FileFailure {
                        file_name: attachment.file_name.clone(),
                        error,
                    });
                    remaining.push(attachment);
                }
            }
        }

        if !remaining.is_empty() {
            self.state = ComposerState::FilesStaged(remaining);
        }
        info!(
            conversation_id = %self.conversation_id,
            sent = report.sent.len(),
            failed = report.failures.len(),
            "staged files sent"
        );
        Ok(report)
    }

    /// Delete every staged object once and return to idle.
    ///
    /// Returns how many deletes succeeded; the composer is reset either way.
    pub async fn cancel_staged(&mut self) -> ChatResult<usize> {
        let files = match self.take_state() {
            ComposerState::FilesStaged(files) => files,
            other => return self.restore(other, "cancel staged files"),
        };

        let mut deleted = 0;
        for attachment in &files {
            if self
                .pipeline
                .discard(&attachment.bucket, &attachment.storage_path)
                .await
            {
                deleted += 1;
            }
        }
        info!(
            conversation_id = %self.conversation_id,
            staged = files.len(),
            deleted,
            "staged files cancelled"
        );
        Ok(deleted)
    }

    /// Cancel whatever the attachment arm currently holds.
    pub async fn cancel(&mut self) -> ChatResult<()> {
        match self.mode() {
            ComposerMode::Recording | ComposerMode::RecordingPaused => self.cancel_recording(),
            ComposerMode::AudioStaged => self.discard_audio(),
            ComposerMode::FilesStaged => self.cancel_staged().await.map(|_| ()),
            ComposerMode::Idle => Err(self.unavailable("cancel")),
        }
    }

    fn take_state(&mut self) -> ComposerState {
        std::mem::take(&mut self.state)
    }

    fn restore<T>(&mut self, state: ComposerState, action: &str) -> ChatResult<T> {
        self.state = state;
        Err(self.unavailable(action))
    }

    fn require_idle(&self, action: &str) -> ChatResult<()> {
        match self.state {
            ComposerState::Idle => Ok(()),
            _ => Err(self.unavailable(action)),
        }
    }

    fn unavailable(&self, action: &str) -> ChatError {
        ChatError::invalid_state(format!(
            "cannot {} while composer is {:?}",
            action,
            self.mode()
        ))
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("conversation_id", &self.conversation_id)
            .field("state", &self.state)
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}
