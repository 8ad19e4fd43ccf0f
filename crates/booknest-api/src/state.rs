use std::sync::Arc;

use anyhow::Context;
use booknest_core::config::Settings;
use booknest_core::Store;

use crate::auth::{LoginLimiter, TokenKeys};
use crate::media::{CloudinaryHost, ImageHost};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenKeys>,
    pub media: Arc<dyn ImageHost>,
    pub login_limiter: Arc<LoginLimiter>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Opens the configured store and image host.
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let store = booknest_store::open(&settings.database)
            .await
            .context("opening the document store")?;
        let media: Arc<dyn ImageHost> = Arc::new(CloudinaryHost::new(&settings.media));
        Ok(Self::with_parts(store, media, settings))
    }

    pub fn with_parts(store: Arc<dyn Store>, media: Arc<dyn ImageHost>, settings: Settings) -> Self {
        let tokens = TokenKeys::new(settings.auth.token_secret(), settings.auth.token_days);
        let login_limiter = LoginLimiter::new(settings.auth.login_per_minute);
        Self {
            store,
            tokens: Arc::new(tokens),
            media,
            login_limiter: Arc::new(login_limiter),
            settings: Arc::new(settings),
        }
    }
}
