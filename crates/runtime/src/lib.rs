use std::sync::Arc;

use anyhow::{Context, Result};
use chatify_chats::{BackendHandle, InMemoryBackend};
use chatify_config::ClientConfig;
use chatify_remote::RemoteBackend;
use once_cell::sync::OnceCell;
use tracing::info;

/// Backend url selecting the in-process backend instead of the platform.
pub const MEMORY_BACKEND_URL: &str = "memory://";

static CLIENT: OnceCell<ClientServices> = OnceCell::new();

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::EnvFilter;

    /// Install the global `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Connection objects shared by everything the client does.
#[derive(Clone, Debug)]
pub struct ClientServices {
    pub config: ClientConfig,
    pub backend: BackendHandle,
    /// Present when running against [`MEMORY_BACKEND_URL`].
    pub memory: Option<Arc<InMemoryBackend>>,
}

impl ClientServices {
    pub fn initialise(config: &ClientConfig) -> Result<Self> {
        if config.backend.url.starts_with(MEMORY_BACKEND_URL) {
            let memory = Arc::new(InMemoryBackend::with_capacity(config.realtime.channel_capacity));
            info!("using in-memory backend");
            return Ok(Self {
                config: config.clone(),
                backend: BackendHandle::from_backend(memory.clone()),
                memory: Some(memory),
            });
        }

        let remote = RemoteBackend::new(config).context("failed to build backend client")?;
        info!(backend = %config.backend.url, "backend client ready");
        Ok(Self {
            config: config.clone(),
            backend: remote.into_handle(),
            memory: None,
        })
    }

    /// Signed-in user from the session configuration.
    pub fn user_id(&self) -> Result<&str> {
        self.config
            .session
            .user_id
            .as_deref()
            .context("no signed-in user; set session.user_id or CHATIFY__SESSION__USER_ID")
    }
}

/// Initialise the process-wide client once and return it.
///
/// Later calls return the first instance and ignore `config`.
pub fn init_client(config: &ClientConfig) -> Result<&'static ClientServices> {
    CLIENT.get_or_try_init(|| ClientServices::initialise(config))
}

/// The process-wide client, if [`init_client`] has run.
pub fn client() -> Option<&'static ClientServices> {
    CLIENT.get()
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
