//! One open conversation: feed, composer, scroll state and side actions.

use std::collections::HashMap;
use std::sync::Arc;

use chatify_config::ClientConfig;
use tokio::time::Instant;
use tracing::{info, warn};

use super::composer::{Composer, KeyOutcome, KeyPress, SendReport, StageReport};
use super::feed::ConversationFeed;
use super::membership::MembershipService;
use super::notices::{NoticeBoard, Notifier};
use super::reactions::{summarize, ReactionService};
use super::recording::CaptureDevice;
use super::scroll::{ScrollCommand, ScrollController};
use super::search::search_messages;
use super::upload::UploadPipeline;
use crate::entities::{FileSelection, Membership, Message, PendingAttachment, Reaction, ReactionSummary};
use crate::repositories::BackendHandle;
use crate::types::{ChatError, ChatResult, ConversationId, FeedUpdate, MessageId, UserId};

/// Something the view should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Appended {
        update: FeedUpdate,
        scroll: Option<ScrollCommand>,
    },
    /// A failure was pushed onto the notice board.
    Notice { id: u64 },
}

/// Session services for one conversation.
///
/// Every failure is returned to the caller and also posted to the notice
/// board, so nothing a user does leaves the session unusable.
pub struct ChatSession {
    conversation_id: ConversationId,
    user_id: UserId,
    feed: ConversationFeed,
    composer: Composer,
    scroll: ScrollController,
    reactions: ReactionService,
    reaction_cache: HashMap<MessageId, Vec<Reaction>>,
    membership: MembershipService,
    notices: NoticeBoard,
    notifier: Arc<dyn Notifier>,
}

impl ChatSession {
    /// Open a conversation the user has accepted.
    ///
    /// Membership is checked once here; revocation while the session is open
    /// is not detected.
    pub async fn open(
        backend: &BackendHandle,
        config: &ClientConfig,
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
        device: Arc<dyn CaptureDevice>,
        notifier: Arc<dyn Notifier>,
    ) -> ChatResult<Self> {
        let conversation_id = conversation_id.into();
        let user_id = user_id.into();

        let membership = MembershipService::new(backend.memberships.clone());
        membership.ensure_accepted(&conversation_id, &user_id).await?;

        let feed = ConversationFeed::open(
            backend,
            conversation_id.clone(),
            user_id.clone(),
            config.presentation.feed_ordering,
        )
        .await?;

        let pipeline = UploadPipeline::new(backend.clone(), config, user_id.clone());
        let composer = Composer::new(conversation_id.clone(), pipeline, device, &config.composer);

        let mut session = Self {
            reactions: ReactionService::new(backend.reactions.clone(), user_id.clone()),
            scroll: ScrollController::from_millis(config.presentation.highlight_millis),
            reaction_cache: HashMap::new(),
            notices: NoticeBoard::default(),
            conversation_id,
            user_id,
            feed,
            composer,
            membership,
            notifier,
        };
        session.refresh_reactions().await;

        info!(
            conversation_id = %session.conversation_id,
            messages = session.feed.len(),
            "chat session opened"
        );
        Ok(session)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn messages(&self) -> &[Message] {
        self.feed.messages()
    }

    pub fn feed(&self) -> &ConversationFeed {
        &self.feed
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Direct access for draft editing and key handling.
    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut NoticeBoard {
        &mut self.notices
    }

    pub fn scroll(&self) -> &ScrollController {
        &self.scroll
    }

    pub fn scroll_mut(&mut self) -> &mut ScrollController {
        &mut self.scroll
    }

    /// Initial viewport command once the history is rendered.
    pub fn initial_scroll(&mut self) -> Option<ScrollCommand> {
        self.scroll.on_feed_changed(self.feed.len(), false)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.feed.set_visible(visible);
    }

    /// Wait for the next realtime event. `None` once the feed is closed.
    ///
    /// A live stream that stops on its own yields one last
    /// [`SessionEvent::Notice`] before `None`.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let result = self.feed.next_update().await?;
        Some(self.handle_update(result))
    }

    /// Process every realtime event that is already available.
    pub async fn pump(&mut self) -> Vec<SessionEvent> {
        self.feed
            .drain_ready()
            .await
            .into_iter()
            .map(|result| self.handle_update(result))
            .collect()
    }

    /// Apply a key press; Enter without shift sends the draft.
    pub async fn handle_key(&mut self, key: KeyPress) -> ChatResult<Option<Message>> {
        match self.composer.handle_key(key) {
            KeyOutcome::Send => self.send_text().await.map(Some),
            _ => Ok(None),
        }
    }

    pub async fn send_text(&mut self) -> ChatResult<Message> {
        let result = self.composer.send_text().await;
        self.settle("Sending message", result).map(|message| self.record(message))
    }

    pub async fn start_recording(&mut self) -> ChatResult<()> {
        let result = self.composer.start_recording().await;
        self.settle("Recording", result)
    }

    pub fn pause_recording(&mut self) -> ChatResult<()> {
        let result = self.composer.pause_recording();
        self.settle("Pausing recording", result)
    }

    pub fn resume_recording(&mut self) -> ChatResult<()> {
        let result = self.composer.resume_recording();
        self.settle("Resuming recording", result)
    }

    pub fn stop_recording(&mut self) -> ChatResult<()> {
        let result = self.composer.stop_recording();
        self.settle("Recording", result)
    }

    pub async fn send_audio(&mut self) -> ChatResult<Message> {
        let result = self.composer.send_audio().await;
        self.settle("Voice message upload", result)
            .map(|message| self.record(message))
    }

    pub async fn stage_files(&mut self, files: Vec<FileSelection>) -> ChatResult<StageReport> {
        let result = self.composer.stage_files(files).await;
        let report = self.settle("File upload", result)?;
        for failure in &report.failures {
            self.notices
                .failure(&format!("Upload of {}", failure.file_name), &failure.error);
        }
        Ok(report)
    }

    pub async fn remove_staged(&mut self, index: usize) -> ChatResult<PendingAttachment> {
        let result = self.composer.remove_staged(index).await;
        self.settle("Removing file", result)
    }

    pub async fn send_staged(&mut self) -> ChatResult<SendReport> {
        let result = self.composer.send_staged().await;
        let report = self.settle("Sending files", result)?;
        for failure in &report.failures {
            self.notices
                .failure(&format!("Sending {}", failure.file_name), &failure.error);
        }
        for message in &report.sent {
            self.record(message.clone());
        }
        Ok(report)
    }

    /// Cancel the recording, staged voice note or staged files.
    pub async fn cancel(&mut self) -> ChatResult<()> {
        let result = self.composer.cancel().await;
        self.settle("Cancel", result)
    }

    /// Text messages of this conversation containing `query`.
    pub fn search(&self, query: &str) -> Vec<&Message> {
        search_messages(self.feed.messages(), query)
    }

    /// Jump to a search result and highlight it.
    pub fn focus_message(&mut self, message_id: &str, now: Instant) -> ChatResult<ScrollCommand> {
        if !self.feed.contains(message_id) {
            let error = ChatError::message_not_found(message_id);
            self.notices.failure("Jump to message", &error);
            return Err(error);
        }
        Ok(self.scroll.focus_message(message_id, now))
    }

    pub fn reactions_for(&self, message_id: &str) -> &[Reaction] {
        self.reaction_cache
            .get(message_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn reaction_summary(&self, message_id: &str) -> Vec<ReactionSummary> {
        summarize(self.reactions_for(message_id), &self.user_id)
    }

    /// Reload reactions for every message in the feed.
    pub async fn refresh_reactions(&mut self) {
        let ids: Vec<MessageId> = self.feed.messages().iter().map(|m| m.id.clone()).collect();
        match self.reactions.fetch(&ids).await {
            Ok(grouped) => self.reaction_cache = grouped,
            Err(error) => {
                warn!(conversation_id = %self.conversation_id, ?error, "failed to load reactions");
                self.notices.failure("Loading reactions", &error);
            }
        }
    }

    pub async fn react(&mut self, message_id: &str, emoji: &str) -> ChatResult<()> {
        let result = self.reactions.react(message_id, emoji).await;
        self.settle("Reaction", result)?;
        self.refresh_reactions().await;
        Ok(())
    }

    /// Returns whether the reaction is present afterwards.
    pub async fn toggle_reaction(&mut self, message_id: &str, emoji: &str) -> ChatResult<bool> {
        let current = self.reactions_for(message_id).to_vec();
        let result = self.reactions.toggle(message_id, emoji, &current).await;
        let present = self.settle("Reaction", result)?;
        self.refresh_reactions().await;
        Ok(present)
    }

    /// Block the other member of this conversation.
    pub async fn block_other(&mut self) -> ChatResult<Membership> {
        let result = self
            .membership
            .block_other(&self.conversation_id, &self.user_id)
            .await;
        self.settle("Blocking user", result)
    }

    /// Tear down the realtime subscription.
    pub fn close(&mut self) {
        self.feed.close();
    }

    fn handle_update(&mut self, result: ChatResult<FeedUpdate>) -> SessionEvent {
        match result {
            Ok(update) => {
                if update.notify {
                    self.notifier
                        .notify("New message", &update.message.preview());
                }
                let scroll = self.scroll.on_feed_changed(self.feed.len(), false);
                SessionEvent::Appended { update, scroll }
            }
            Err(error) => {
                let action = match error {
                    ChatError::SubscriptionClosed | ChatError::Lagged { .. } => "Live updates",
                    _ => "Receiving message",
                };
                SessionEvent::Notice {
                    id: self.notices.failure(action, &error),
                }
            }
        }
    }

    fn record(&mut self, message: Message) -> Message {
        if self.feed.record_sent(message.clone()) {
            self.scroll.on_feed_changed(self.feed.len(), false);
        }
        message
    }

    fn settle<T>(&mut self, action: &str, result: ChatResult<T>) -> ChatResult<T> {
        if let Err(error) = &result {
            warn!(conversation_id = %self.conversation_id, action, ?error, "session action failed");
            self.notices.failure(action, error);
        }
        result
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation_id", &self.conversation_id)
            .field("user_id", &self.user_id)
            .field("messages", &self.feed.len())
            .field("composer", &self.composer.mode())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MembershipStatus, NewMessage};
    use crate::repositories::{ConversationRepository, InMemoryBackend, MessageRepository};
    use crate::services::composer::ComposerMode;
    use crate::services::notices::NoticeLevel;
    use crate::services::recording::ScriptedCaptureDevice;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        bodies: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _title: &str, body: &str) {
            self.bodies.lock().unwrap().push(body.to_string());
        }
    }

    async fn backend_with(status: MembershipStatus) -> (Arc<InMemoryBackend>, BackendHandle) {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .add_conversation("c1", &[("me", status), ("them", MembershipStatus::Accepted)])
            .await;
        let handle = BackendHandle::from_backend(backend.clone());
        (backend, handle)
    }

    async fn open(
        handle: &BackendHandle,
        notifier: Arc<RecordingNotifier>,
    ) -> ChatResult<ChatSession> {
        ChatSession::open(
            handle,
            &ClientConfig::default(),
            "c1",
            "me",
            Arc::new(ScriptedCaptureDevice::new(vec![1u8, 2, 3])),
            notifier,
        )
        .await
    }

    #[tokio::test]
    async fn test_open_requires_accepted_membership() {
        let (_backend, handle) = backend_with(MembershipStatus::Pending).await;
        let error = open(&handle, Arc::default()).await.unwrap_err();
        assert!(matches!(error, ChatError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn test_remote_insert_appends_and_notifies_when_hidden() {
        let (backend, handle) = backend_with(MembershipStatus::Accepted).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let mut session = open(&handle, notifier.clone()).await.unwrap();
        assert!(session.messages().is_empty());
        assert_eq!(session.initial_scroll(), None);

        backend.insert(NewMessage::text("c1", "them", "hello")).await.unwrap();
        let events = session.pump().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Appended { update, scroll } => {
                assert_eq!(update.message.text(), Some("hello"));
                assert!(!update.notify);
                assert_eq!(*scroll, Some(ScrollCommand::JumpToBottom));
            }
            other => panic!("unexpected event {other:?}"),
        }

        session.set_visible(false);
        backend.insert(NewMessage::text("c1", "them", "are you there")).await.unwrap();
        let events = session.pump().await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            notifier.bodies.lock().unwrap().as_slice(),
            ["are you there".to_string()]
        );
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_deleted_conversation_posts_notice() {
        let (backend, handle) = backend_with(MembershipStatus::Accepted).await;
        let mut session = open(&handle, Arc::default()).await.unwrap();

        ConversationRepository::delete(backend.as_ref(), "c1").await.unwrap();
        let event = session.next_event().await.expect("stream end should surface");
        let id = match event {
            SessionEvent::Notice { id } => id,
            other => panic!("unexpected event {other:?}"),
        };

        let notice = session.notices().latest().unwrap();
        assert_eq!(notice.id, id);
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Live updates failed: Realtime subscription closed");
        assert!(!session.feed().is_open());
        assert!(session.next_event().await.is_none());
        assert_eq!(session.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_missed_inserts_are_recovered_with_notice() {
        let backend = Arc::new(InMemoryBackend::with_capacity(2));
        backend
            .add_conversation(
                "c1",
                &[("me", MembershipStatus::Accepted), ("them", MembershipStatus::Accepted)],
            )
            .await;
        let handle = BackendHandle::from_backend(backend.clone());
        let mut session = open(&handle, Arc::default()).await.unwrap();

        for n in 0..5 {
            backend
                .insert(NewMessage::text("c1", "them", format!("burst {n}")))
                .await
                .unwrap();
        }

        let events = session.pump().await;
        let appended = events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Appended { .. }))
            .count();
        assert_eq!(appended, 5);
        assert_eq!(session.messages().len(), 5);
        assert_eq!(session.notices().len(), 1);
        assert!(session.feed().is_open());
    }

    #[tokio::test]
    async fn test_enter_sends_draft_and_echo_is_deduplicated() {
        let (_backend, handle) = backend_with(MembershipStatus::Accepted).await;
        let mut session = open(&handle, Arc::default()).await.unwrap();

        for c in "hi".chars() {
            session.handle_key(KeyPress::Char(c)).await.unwrap();
        }
        let sent = session
            .handle_key(KeyPress::Enter { shift: false })
            .await
            .unwrap()
            .expect("enter should send");

        assert_eq!(sent.text(), Some("hi"));
        assert!(session.composer().draft().is_empty());
        assert_eq!(session.messages().len(), 1);
        assert!(session.pump().await.is_empty());
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_become_notices_and_leave_composer_usable() {
        let (backend, handle) = backend_with(MembershipStatus::Accepted).await;
        backend.fail_uploads_of_type("image/png").await;
        let mut session = open(&handle, Arc::default()).await.unwrap();

        let report = session
            .stage_files(vec![FileSelection::new("a.png", "image/png", vec![1u8; 4])])
            .await
            .unwrap();
        assert!(report.staged.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(session.composer().mode(), ComposerMode::Idle);
        assert_eq!(session.notices().len(), 1);
        assert_eq!(session.notices().latest().unwrap().level, NoticeLevel::Error);

        let error = session.send_text().await.unwrap_err();
        assert!(matches!(error, ChatError::Validation { .. }));
        assert_eq!(session.notices().latest().unwrap().level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_search_and_focus() {
        let (backend, handle) = backend_with(MembershipStatus::Accepted).await;
        let first = backend.insert(NewMessage::text("c1", "them", "Lunch at noon?")).await.unwrap();
        backend.insert(NewMessage::text("c1", "me", "sure")).await.unwrap();
        let mut session = open(&handle, Arc::default()).await.unwrap();

        let results = session.search("LUNCH");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, first.id);

        let now = Instant::now();
        let command = session.focus_message(&first.id, now).unwrap();
        assert_eq!(
            command,
            ScrollCommand::IntoView { message_id: first.id.clone(), center: true }
        );
        assert_eq!(session.scroll().highlighted(now), Some(first.id.as_str()));

        let error = session.focus_message("missing", now).unwrap_err();
        assert!(matches!(error, ChatError::MessageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_toggle_reaction_updates_summary() {
        let (backend, handle) = backend_with(MembershipStatus::Accepted).await;
        let message = backend.insert(NewMessage::text("c1", "them", "news")).await.unwrap();
        let mut session = open(&handle, Arc::default()).await.unwrap();

        assert!(session.toggle_reaction(&message.id, "🎉").await.unwrap());
        let summary = session.reaction_summary(&message.id);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 1);
        assert!(summary[0].mine);

        assert!(!session.toggle_reaction(&message.id, "🎉").await.unwrap());
        assert!(session.reaction_summary(&message.id).is_empty());
    }

    #[tokio::test]
    async fn test_block_other_and_close() {
        let (backend, handle) = backend_with(MembershipStatus::Accepted).await;
        let mut session = open(&handle, Arc::default()).await.unwrap();
        assert_eq!(backend.subscriber_count("c1").await, 1);

        let blocked = session.block_other().await.unwrap();
        assert_eq!(blocked.user_id, "them");
        assert_eq!(blocked.status, MembershipStatus::Blocked);

        session.close();
        assert!(!session.feed().is_open());
        assert_eq!(backend.subscriber_count("c1").await, 0);
        assert!(session.next_event().await.is_none());
    }
}
