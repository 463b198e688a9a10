use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::core::api::{BackendApi, RestApi};
use crate::core::auth::AuthSession;
use crate::core::config::Config;
use crate::core::http::HttpClient;
use crate::core::store::TranscriptStore;
use crate::core::tokens::TokenStore;

/// Application context: config, session and transcript store wired to one
/// backend. Built once at startup and injected everywhere; nothing here is
/// global.
pub struct App {
    pub config: Config,
    pub session: AuthSession,
    pub transcripts: TranscriptStore,
}

impl App {
    /// Load config, wire the stores, and reconcile any persisted session
    /// before the first command runs. A stale session that can't be restored
    /// degrades to anonymous instead of failing startup.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Result<Self> {
        let http = HttpClient::new(
            &config.api.base_url,
            Duration::from_secs(config.api.timeout_secs),
        )?;
        let api: Arc<dyn BackendApi> = Arc::new(RestApi::new(http));
        let tokens = TokenStore::new(config.storage.token_path.clone());

        let session = AuthSession::new(api.clone(), tokens);
        if let Err(e) = session.initialize_auth().await {
            warn!("could not restore previous session: {e}");
        }

        let transcripts = TranscriptStore::new(api);

        Ok(Self {
            config,
            session,
            transcripts,
        })
    }
}
