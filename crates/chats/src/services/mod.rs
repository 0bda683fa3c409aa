//! Client-side session services.
//!
//! The composer, upload pipeline, realtime feed and scroll controller make up
//! one open conversation; [`ChatSession`] ties them together with reactions,
//! membership actions and notices.

pub mod composer;
pub mod directory;
pub mod feed;
pub mod membership;
pub mod notices;
pub mod reactions;
pub mod recording;
pub mod scroll;
pub mod search;
pub mod session;
pub mod upload;

pub use composer::{
    Composer, ComposerControls, ComposerMode, ComposerState, FileFailure, KeyOutcome, KeyPress,
    SendReport, StageReport,
};
pub use directory::{ConversationDirectory, PROFILE_SEARCH_LIMIT};
pub use feed::{ConversationFeed, NotificationGate};
pub use membership::MembershipService;
pub use notices::{Notice, NoticeBoard, NoticeLevel, Notifier, TracingNotifier};
pub use reactions::{summarize, ReactionService};
pub use recording::{
    format_elapsed, CaptureDevice, CaptureHandle, RecordingSession, ScriptedCaptureDevice,
};
pub use scroll::{initials, shows_avatar, ScrollCommand, ScrollController};
pub use search::search_messages;
pub use session::{ChatSession, SessionEvent};
pub use upload::{storage_key, UploadKind, UploadPipeline, UploadRequest, UploadedObject};
