use anyhow::{Context, Result};
use booknest_api::Server;
use booknest_core::config::ConfigManager;
use booknest_core::Role;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "booknest")]
#[command(about = "BookNest reading platform API server", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration environment (selects config/<env>.toml)
    #[arg(long, global = true, env = "APP_ENV")]
    env: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,
        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Give an existing account the admin role
    Promote {
        username: String,
    },
}

fn init_tracing(directive: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigManager::load(cli.env)?;
    let mut settings = config.settings().clone();
    init_tracing(&settings.logging.level);
    for notice in config.notices() {
        warn!("{}", notice);
    }
    info!(
        env = %settings.env,
        backend = ?settings.database.backend,
        "Using configuration from {:?}",
        config.config_dir()
    );

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            Server::new(settings).await?.run().await
        }
        Commands::Promote { username } => {
            let store = booknest_store::open(&settings.database)
                .await
                .context("opening the document store")?;
            if store.backend() == "memory" {
                warn!("The memory backend does not persist; the promotion is lost on exit");
            }
            let mut user = store
                .user_by_username(username.trim())
                .await?
                .with_context(|| format!("no user named '{}'", username))?;
            user.role = Role::Admin;
            user.updated_at = booknest_core::time::now();
            store.update_user(&user).await?;
            info!(user_id = %user.id, username = %user.username, "User promoted to admin");
            Ok(())
        }
    }
}
