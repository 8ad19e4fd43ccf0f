use std::net::SocketAddr;

use anyhow::{Context, Result};
use booknest_core::config::Settings;
use booknest_core::{Category, Store, DEFAULT_CATEGORY_SLUG};
use tokio::signal;
use tracing::{info, warn};

use crate::services::settings;
use crate::{create_router, AppState};

pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    pub async fn new(settings: Settings) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
            .parse()
            .context("parsing server.host and server.port")?;
        if settings.auth.token_secret.is_none() {
            warn!("auth.token_secret is not set; tokens are signed with the development fallback");
        }

        let state = AppState::from_settings(settings).await?;
        seed_defaults(state.store.as_ref())
            .await
            .context("seeding default documents")?;
        Ok(Self { state, addr })
    }

    pub async fn run(self) -> Result<()> {
        let router = create_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("binding {}", self.addr))?;

        info!("BookNest API listening on http://{}", self.addr);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("serving HTTP")?;

        info!("Server stopped");
        Ok(())
    }
}

/// Creates the fallback category and the site settings when they are missing.
pub async fn seed_defaults(store: &dyn Store) -> booknest_core::Result<()> {
    if store.category_by_slug(DEFAULT_CATEGORY_SLUG).await?.is_none() {
        store.insert_category(Category::fallback()).await?;
        info!(category = DEFAULT_CATEGORY_SLUG, "Seeded fallback category");
    }
    settings::current(store).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            warn!("Received SIGTERM, shutting down");
        },
    }
}
