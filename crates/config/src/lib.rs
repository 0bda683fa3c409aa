use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "chatify.toml",
    "config/chatify.toml",
    "crates/config/chatify.toml",
    "../chatify.toml",
    "../config/chatify.toml",
    "../crates/config/chatify.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub realtime: RealtimeConfig,
    pub composer: ComposerConfig,
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Connection settings for the hosted backend platform.
///
/// ```
/// use chatify_config::BackendConfig;
///
/// let backend = BackendConfig::default();
/// assert_eq!(backend.url, "http://127.0.0.1:54321");
/// assert_eq!(backend.request_timeout_seconds, 30);
/// assert!(backend.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "BackendConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl BackendConfig {
    const fn default_request_timeout() -> u64 {
        30
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:54321".to_string(),
            api_key: None,
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub file_bucket: String,
    pub voice_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_bucket: "chat-files".to_string(),
            voice_bucket: "voice-messages".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Websocket endpoint. Derived from the backend url when unset.
    #[serde(default)]
    pub url: Option<String>,
    pub heartbeat_seconds: u64,
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            heartbeat_seconds: 30,
            channel_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    pub max_file_size_bytes: u64,
    pub max_text_length: usize,
    pub voice_content_type: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024,
            max_text_length: 100_000,
            voice_content_type: "audio/webm".to_string(),
        }
    }
}

/// How the realtime feed places incoming messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOrdering {
    /// Append in the order the realtime stream delivers inserts.
    #[default]
    Arrival,
    /// Insert by creation timestamp, tolerating out-of-order delivery.
    CreatedAt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationConfig {
    pub highlight_millis: u64,
    #[serde(default)]
    pub feed_ordering: FeedOrdering,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            highlight_millis: 1_200,
            feed_ordering: FeedOrdering::Arrival,
        }
    }
}

/// Identity of the signed-in user. Obtaining it is left to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}

/// Load the client configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use chatify_config::load;
///
/// std::env::remove_var("CHATIFY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.backend.url.is_empty());
/// ```
pub fn load() -> anyhow::Result<ClientConfig> {
    let defaults = ClientConfig::default();

    let timeout = i64::try_from(defaults.backend.request_timeout_seconds).unwrap_or(i64::MAX);
    let max_file_size = i64::try_from(defaults.composer.max_file_size_bytes).unwrap_or(i64::MAX);
    let max_text = i64::try_from(defaults.composer.max_text_length).unwrap_or(i64::MAX);
    let capacity = i64::try_from(defaults.realtime.channel_capacity).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("backend.url", defaults.backend.url.clone())?
        .set_default("backend.request_timeout_seconds", timeout)?
        .set_default("storage.file_bucket", defaults.storage.file_bucket.clone())?
        .set_default("storage.voice_bucket", defaults.storage.voice_bucket.clone())?
        .set_default(
            "realtime.heartbeat_seconds",
            i64::try_from(defaults.realtime.heartbeat_seconds).unwrap_or(i64::MAX),
        )?
        .set_default("realtime.channel_capacity", capacity)?
        .set_default("composer.max_file_size_bytes", max_file_size)?
        .set_default("composer.max_text_length", max_text)?
        .set_default(
            "composer.voice_content_type",
            defaults.composer.voice_content_type.clone(),
        )?
        .set_default(
            "presentation.highlight_millis",
            i64::try_from(defaults.presentation.highlight_millis).unwrap_or(i64::MAX),
        )?
        .set_default("presentation.feed_ordering", "arrival")?;

    let environment_overrides = config::Environment::with_prefix("CHATIFY").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("CHATIFY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via CHATIFY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<ClientConfig>()
        .context("invalid configuration")?;

    if config.realtime.channel_capacity == 0 {
        config.realtime.channel_capacity = defaults.realtime.channel_capacity;
    }

    debug!(
        backend = %config.backend.url,
        ordering = ?config.presentation.feed_ordering,
        "loaded client configuration"
    );
    Ok(config)
}

impl ClientConfig {
    /// Websocket endpoint for realtime change notification.
    ///
    /// ```
    /// use chatify_config::ClientConfig;
    ///
    /// let mut config = ClientConfig::default();
    /// config.backend.url = "https://demo.example.co/".to_string();
    /// assert_eq!(config.realtime_url(), "wss://demo.example.co/realtime/v1/websocket");
    /// ```
    pub fn realtime_url(&self) -> String {
        if let Some(url) = &self.realtime.url {
            return url.clone();
        }

        let base = self.backend.url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/realtime/v1/websocket")
    }
}
